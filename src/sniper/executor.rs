//! Buy execution through the Sniperoo trading API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("invalid buy request: {0}")]
    InvalidRequest(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    ApiError { status: u16, body: String },
}

/// What to buy and how the position should be closed.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyRequest {
    pub mint: String,
    /// Input amount in SOL.
    pub amount: f64,
    pub auto_sell: bool,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
}

/// Downstream action run for every admitted token.
#[async_trait]
pub trait ExecutionAction: Send + Sync {
    /// Returns true when the buy was accepted.
    async fn execute(&self, request: &BuyRequest) -> bool;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuyTokenBody<'a> {
    wallet_addresses: [&'a str; 1],
    token_address: &'a str,
    input_amount: f64,
    is_buying: bool,
    auto_sell: AutoSell,
}

#[derive(Debug, Serialize)]
struct AutoSell {
    enabled: bool,
    strategy: SellStrategy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SellStrategy {
    strategy_name: &'static str,
    profit_percentage: f64,
    stop_loss_percentage: f64,
}

pub struct SniperooClient {
    http: Client,
    base_url: String,
    api_key: String,
    wallet: String,
}

impl SniperooClient {
    pub fn new(
        base_url: String,
        api_key: String,
        wallet: String,
        timeout: Duration,
    ) -> Result<Self, ExecutionError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            wallet,
        })
    }

    /// Place the buy. Auto-sell is switched off when either target is zero.
    pub async fn buy(&self, request: &BuyRequest) -> Result<(), ExecutionError> {
        let body = buy_body(request, &self.wallet)?;
        let url = format!("{}/trading/buy-token?toastFrontendId=0", self.base_url);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExecutionError::ApiError { status, body });
        }
        debug!(mint = %request.mint, status, "buy-token accepted");
        Ok(())
    }
}

fn buy_body<'a>(request: &'a BuyRequest, wallet: &'a str) -> Result<BuyTokenBody<'a>, ExecutionError> {
    if request.mint.trim().is_empty() {
        return Err(ExecutionError::InvalidRequest("empty mint"));
    }
    if request.amount <= 0.0 {
        return Err(ExecutionError::InvalidRequest("amount must be positive"));
    }
    let auto_sell = request.auto_sell && request.take_profit_pct != 0.0 && request.stop_loss_pct != 0.0;

    Ok(BuyTokenBody {
        wallet_addresses: [wallet],
        token_address: &request.mint,
        input_amount: request.amount,
        is_buying: true,
        auto_sell: AutoSell {
            enabled: auto_sell,
            strategy: SellStrategy {
                strategy_name: "simple",
                profit_percentage: request.take_profit_pct,
                stop_loss_percentage: request.stop_loss_pct,
            },
        },
    })
}

#[async_trait]
impl ExecutionAction for SniperooClient {
    async fn execute(&self, request: &BuyRequest) -> bool {
        match self.buy(request).await {
            Ok(()) => {
                info!(mint = %request.mint, amount = request.amount, "buy placed via Sniperoo");
                true
            }
            Err(e) => {
                error!(mint = %request.mint, error = %e, "Sniperoo buy failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BuyRequest {
        BuyRequest {
            mint: "MINTXYZ".to_string(),
            amount: 0.05,
            auto_sell: true,
            take_profit_pct: 30.0,
            stop_loss_pct: 15.0,
        }
    }

    #[test]
    fn test_buy_body_shape() {
        let req = request();
        let body = serde_json::to_value(buy_body(&req, "WALLET").unwrap()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "walletAddresses": ["WALLET"],
                "tokenAddress": "MINTXYZ",
                "inputAmount": 0.05,
                "isBuying": true,
                "autoSell": {
                    "enabled": true,
                    "strategy": {
                        "strategyName": "simple",
                        "profitPercentage": 30.0,
                        "stopLossPercentage": 15.0
                    }
                }
            })
        );
    }

    #[test]
    fn test_zero_target_disables_auto_sell() {
        let req = BuyRequest {
            stop_loss_pct: 0.0,
            ..request()
        };
        let body = buy_body(&req, "WALLET").unwrap();
        assert!(!body.auto_sell.enabled);
    }

    #[test]
    fn test_rejects_empty_mint_and_bad_amount() {
        let empty = BuyRequest {
            mint: "  ".to_string(),
            ..request()
        };
        assert!(matches!(buy_body(&empty, "W"), Err(ExecutionError::InvalidRequest(_))));

        let zero = BuyRequest {
            amount: 0.0,
            ..request()
        };
        assert!(matches!(buy_body(&zero, "W"), Err(ExecutionError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_network() {
        let client = SniperooClient::new(
            "http://127.0.0.1:9".to_string(),
            "KEY".to_string(),
            "WALLET".to_string(),
            Duration::from_millis(100),
        )
        .unwrap();
        let req = BuyRequest {
            amount: -1.0,
            ..request()
        };
        assert!(matches!(client.buy(&req).await, Err(ExecutionError::InvalidRequest(_))));
        assert!(!client.execute(&req).await);
    }
}
