//! Streaming side of the pipeline: the reconnecting websocket, the
//! `logsSubscribe` table, and inbound frame classification.

pub mod connection;
pub mod message;
pub mod subscription;

pub use connection::{Backoff, ConnectionEvent, ConnectionManager, ConnectionSettings, ConnectionState, InboundFrame};
pub use message::InboundMessage;
pub use subscription::{Subscription, SubscriptionRegistry};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WsError {
    #[error("websocket error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed: {0}")]
    Closed(String),
}
