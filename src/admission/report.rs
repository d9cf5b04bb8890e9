//! Rug-check token report and its source.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("malformed report: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Token report (subset of the rug-check response we evaluate).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenReport {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub risks: Vec<RiskItem>,
    #[serde(default)]
    pub rugged: bool,
    #[serde(default)]
    pub creator: Option<String>,
    pub token: TokenInfo,
    #[serde(default)]
    pub token_meta: TokenMeta,
    #[serde(default)]
    pub top_holders: Vec<TokenHolder>,
    #[serde(default)]
    pub markets: Option<Vec<Market>>,
    #[serde(default, rename = "totalLPProviders")]
    pub total_lp_providers: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RiskItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub value: String,
}

/// Authority keys must be present; `null` means revoked.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    #[serde(deserialize_with = "nullable")]
    pub mint_authority: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub freeze_authority: Option<String>,
    #[serde(default)]
    pub is_initialized: bool,
}

fn nullable<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Option::<String>::deserialize(d)
}

impl Default for TokenInfo {
    fn default() -> Self {
        Self {
            mint_authority: None,
            freeze_authority: None,
            is_initialized: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TokenMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    /// `None` when the report omits the flag; only `Some(false)` counts as immutable.
    #[serde(default)]
    pub mutable: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TokenHolder {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub pct: f64,
    #[serde(default)]
    pub insider: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    #[serde(default)]
    pub liquidity_a: Option<String>,
    #[serde(default)]
    pub liquidity_b: Option<String>,
    #[serde(default)]
    pub liquidity: Option<f64>,
}

impl TokenReport {
    /// Decode a report body. A body without the `token` object or its
    /// authority keys is malformed.
    pub fn parse(body: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn markets(&self) -> &[Market] {
        self.markets.as_deref().unwrap_or(&[])
    }

    /// Report creator, falling back to the mint itself.
    pub fn creator_or<'a>(&'a self, mint: &'a str) -> &'a str {
        self.creator.as_deref().filter(|c| !c.is_empty()).unwrap_or(mint)
    }

    /// Liquidity account addresses of every market.
    pub fn liquidity_addresses(&self) -> Vec<&str> {
        self.markets()
            .iter()
            .flat_map(|m| [m.liquidity_a.as_deref(), m.liquidity_b.as_deref()])
            .flatten()
            .filter(|a| !a.is_empty())
            .collect()
    }
}

/// Where token reports come from.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_report(&self, mint: &str) -> Result<TokenReport, ReportError>;
}

/// rugcheck.xyz report API.
pub struct RugCheckClient {
    http: Client,
    base_url: String,
}

impl RugCheckClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ReportError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ReportSource for RugCheckClient {
    async fn fetch_report(&self, mint: &str) -> Result<TokenReport, ReportError> {
        let url = format!("{}/v1/tokens/{}/report", self.base_url, mint);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReportError::Http { status, body });
        }
        let report = TokenReport::parse(&resp.text().await?)?;
        debug!(
            mint = %mint,
            score = report.score,
            risks = report.risks.len(),
            holders = report.top_holders.len(),
            markets = report.markets().len(),
            "rug check report"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{Admission, AdmissionRuleEngine, CheckSettings, RejectReason};
    use crate::store::MemoryHistoryStore;
    use std::sync::Arc;

    struct RawReports(&'static str);

    #[async_trait]
    impl ReportSource for RawReports {
        async fn fetch_report(&self, _mint: &str) -> Result<TokenReport, ReportError> {
            TokenReport::parse(self.0)
        }
    }

    fn engine(body: &'static str) -> AdmissionRuleEngine {
        AdmissionRuleEngine::new(
            CheckSettings::default(),
            Arc::new(RawReports(body)),
            Arc::new(MemoryHistoryStore::new()),
        )
    }

    #[test]
    fn test_deserializes_rugcheck_shape() {
        let report: TokenReport = serde_json::from_value(serde_json::json!({
            "score": 101,
            "risks": [{"name": "Low Liquidity", "description": "", "level": "warn", "value": "$12"}],
            "rugged": false,
            "creator": "CREATOR1",
            "token": {"mintAuthority": null, "freezeAuthority": "FREEZER", "isInitialized": true},
            "tokenMeta": {"name": "Dog Coin", "symbol": "DOG", "mutable": false},
            "topHolders": [{"address": "POOL_A", "pct": 80.5, "insider": false}],
            "markets": [{"liquidityA": "POOL_A", "liquidityB": "POOL_B", "liquidity": 12.0}],
            "totalLPProviders": 2,
            "fileMeta": {"ignored": true}
        }))
        .unwrap();

        assert_eq!(report.score, 101.0);
        assert_eq!(report.token.mint_authority, None);
        assert_eq!(report.token.freeze_authority.as_deref(), Some("FREEZER"));
        assert_eq!(report.token_meta.mutable, Some(false));
        assert_eq!(report.total_lp_providers, 2);
        assert_eq!(report.liquidity_addresses(), vec!["POOL_A", "POOL_B"]);
        assert_eq!(report.creator_or("MINT"), "CREATOR1");
    }

    #[test]
    fn test_creator_falls_back_to_mint() {
        let report = TokenReport::default();
        assert_eq!(report.creator_or("MINT"), "MINT");
        assert!(report.markets().is_empty());
    }

    #[test]
    fn test_missing_token_or_authority_keys_is_malformed() {
        assert!(matches!(TokenReport::parse("{}"), Err(ReportError::Malformed(_))));
        assert!(TokenReport::parse(r#"{"token": {"isInitialized": true}}"#).is_err());
        assert!(TokenReport::parse(r#"{"token": {"mintAuthority": null, "isInitialized": true}}"#).is_err());

        let revoked = TokenReport::parse(
            r#"{"token": {"mintAuthority": null, "freezeAuthority": null, "isInitialized": true}}"#,
        )
        .unwrap();
        assert_eq!(revoked.token.mint_authority, None);
        assert_eq!(revoked.token.freeze_authority, None);
    }

    #[tokio::test]
    async fn test_incomplete_report_is_unavailable_in_every_mode() {
        for body in [
            "{}",
            r#"{"token": {"isInitialized": true}}"#,
            r#"{"token": {"freezeAuthority": null, "isInitialized": true}}"#,
        ] {
            let engine = engine(body);
            assert_eq!(
                engine.check("M").await,
                Admission::Rejected(RejectReason::ReportUnavailable),
                "check on {body}"
            );
            assert_eq!(
                engine.check_authorities("M").await,
                Admission::Rejected(RejectReason::ReportUnavailable),
                "check_authorities on {body}"
            );
        }
    }
}
