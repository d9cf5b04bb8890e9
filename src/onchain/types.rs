//! Ledger record types and the lookup trait.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

/// A transaction as returned by `getTransaction` (subset of fields we need).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub pre_token_balances: Option<Vec<TokenBalance>>,
    #[serde(default)]
    pub post_token_balances: Option<Vec<TokenBalance>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    #[serde(default)]
    pub account_index: u32,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
}

impl TransactionMeta {
    /// Post-change balances, or pre-change balances when post is absent.
    pub fn token_balances(&self) -> Option<&[TokenBalance]> {
        self.post_token_balances
            .as_deref()
            .or(self.pre_token_balances.as_deref())
    }
}

/// Lookup of a transaction by signature.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// `Ok(None)` when the node does not (yet) know the transaction.
    async fn fetch_transaction(&self, signature: &str) -> Result<Option<LedgerRecord>, LedgerError>;
}
