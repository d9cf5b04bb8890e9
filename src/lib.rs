//! Library modules for the poolsnipe new-pool sniper.
//!
//! The binary wires these together; tests and other tools can use them
//! directly.

pub mod admission;
pub mod config;
pub mod notify;
pub mod onchain;
pub mod retry;
pub mod sniper;
pub mod store;
pub mod ws;
