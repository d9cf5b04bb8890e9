//! JSON-RPC `getTransaction` over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::types::{LedgerClient, LedgerError, LedgerRecord};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<LedgerRecord>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

pub struct RpcLedgerClient {
    http: Client,
    url: String,
}

impl RpcLedgerClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, LedgerError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn fetch_transaction(&self, signature: &str) -> Result<Option<LedgerRecord>, LedgerError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTransaction",
            "params": [
                signature,
                {
                    "encoding": "jsonParsed",
                    "maxSupportedTransactionVersion": 0,
                    "commitment": "confirmed",
                }
            ],
        });

        let resp = self.http.post(&self.url).json(&body).send().await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Http { status, body });
        }

        let parsed: RpcResponse = resp.json().await?;
        if let Some(err) = parsed.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        debug!(
            signature = %signature,
            found = parsed.result.is_some(),
            "getTransaction"
        );
        Ok(parsed.result)
    }
}
