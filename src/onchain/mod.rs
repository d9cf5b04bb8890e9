//! Ledger side of the pipeline: fetching a transaction by signature and
//! extracting the newly created token mint from its balance changes.
//!
//! - `LedgerClient`: trait over the `getTransaction` lookup
//! - `RpcLedgerClient`: JSON-RPC implementation over HTTP
//! - `IdentifierResolver`: bounded-retry signature → mint resolution

pub mod resolver;
pub mod rpc;
pub mod types;

pub use resolver::IdentifierResolver;
pub use rpc::RpcLedgerClient;
pub use types::{LedgerClient, LedgerError, LedgerRecord, TokenBalance, TransactionMeta};

/// Wrapped SOL, the quote side of every pool we watch.
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
