//! Admission rules: decide from a token report whether a freshly created
//! token is worth buying.
//!
//! Evaluation runs a fixed, ordered table of reject conditions over the
//! report; the first condition that fires decides. A token that passes every
//! condition is then checked against the history store for a previously seen
//! name or creator. Every evaluated token is recorded afterwards.

pub mod report;

pub use report::{ReportError, ReportSource, RugCheckClient, TokenHolder, TokenReport};

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::store::{HistoryRecord, HistoryStore};

// --- Settings ---

/// Thresholds, allow flags and block lists for admission.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckSettings {
    #[serde(default)]
    pub allow_mint_authority: bool,
    #[serde(default)]
    pub allow_not_initialized: bool,
    #[serde(default)]
    pub allow_freeze_authority: bool,
    #[serde(default)]
    pub allow_mutable: bool,
    #[serde(default)]
    pub allow_insider_topholders: bool,
    #[serde(default = "default_max_pct_topholders")]
    pub max_allowed_pct_topholders: f64,
    #[serde(default = "default_true")]
    pub exclude_lp_from_topholders: bool,
    #[serde(default = "default_min_one")]
    pub min_total_lp_providers: u64,
    #[serde(default = "default_min_one")]
    pub min_total_markets: u64,
    #[serde(default)]
    pub allow_rugged: bool,
    /// 0 disables the score check.
    #[serde(default)]
    pub max_score: f64,
    #[serde(default = "default_block_list")]
    pub block_symbols: Vec<String>,
    #[serde(default = "default_block_list")]
    pub block_names: Vec<String>,
    #[serde(default = "default_true")]
    pub ignore_ends_with_pump: bool,
    #[serde(default = "default_min_market_liquidity")]
    pub min_total_market_liquidity: f64,
    #[serde(default = "default_true")]
    pub block_returning_token_names: bool,
    #[serde(default = "default_true")]
    pub block_returning_token_creators: bool,
}

fn default_true() -> bool {
    true
}
fn default_max_pct_topholders() -> f64 {
    50.0
}
fn default_min_one() -> u64 {
    1
}
fn default_block_list() -> Vec<String> {
    vec!["XXX".to_string()]
}
fn default_min_market_liquidity() -> f64 {
    5000.0
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            allow_mint_authority: false,
            allow_not_initialized: false,
            allow_freeze_authority: false,
            allow_mutable: false,
            allow_insider_topholders: false,
            max_allowed_pct_topholders: default_max_pct_topholders(),
            exclude_lp_from_topholders: true,
            min_total_lp_providers: default_min_one(),
            min_total_markets: default_min_one(),
            allow_rugged: false,
            max_score: 0.0,
            block_symbols: default_block_list(),
            block_names: default_block_list(),
            ignore_ends_with_pump: true,
            min_total_market_liquidity: default_min_market_liquidity(),
            block_returning_token_names: true,
            block_returning_token_creators: true,
        }
    }
}

impl CheckSettings {
    pub fn duplicate_detection(&self) -> bool {
        self.block_returning_token_names || self.block_returning_token_creators
    }
}

// --- Verdicts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MintAuthority,
    NotInitialized,
    FreezeAuthority,
    Mutable,
    InsiderHolders,
    HolderConcentration,
    TooFewLpProviders,
    TooFewMarkets,
    Rugged,
    ScoreTooHigh,
    BlockedSymbol,
    BlockedName,
    EndsWithPump,
    LowMarketLiquidity,
    DuplicateName,
    DuplicateCreator,
    /// The mint address itself ends in "pump".
    PumpMint,
    /// The report could not be fetched; the token is rejected as inconclusive.
    ReportUnavailable,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RejectReason::MintAuthority => "mint authority should be null",
            RejectReason::NotInitialized => "token is not initialized",
            RejectReason::FreezeAuthority => "freeze authority should be null",
            RejectReason::Mutable => "metadata should not be mutable",
            RejectReason::InsiderHolders => "insider accounts among top holders",
            RejectReason::HolderConcentration => "a top holder exceeds the allowed supply share",
            RejectReason::TooFewLpProviders => "not enough LP providers",
            RejectReason::TooFewMarkets => "not enough markets",
            RejectReason::Rugged => "token is rugged",
            RejectReason::ScoreTooHigh => "rug score too high",
            RejectReason::BlockedSymbol => "symbol is blocked",
            RejectReason::BlockedName => "name is blocked",
            RejectReason::EndsWithPump => "name or symbol ends with 'pump'",
            RejectReason::LowMarketLiquidity => "market liquidity below minimum",
            RejectReason::DuplicateName => "token with this name was already created",
            RejectReason::DuplicateCreator => "creator already launched a token",
            RejectReason::PumpMint => "mint address ends with 'pump'",
            RejectReason::ReportUnavailable => "report unavailable, inconclusive",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(RejectReason),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

// --- Conditions ---

/// Report plus the holder list the conditions look at.
struct ReportView<'a> {
    report: &'a TokenReport,
    holders: Vec<&'a TokenHolder>,
}

/// Ordered (predicate, reason) pair. The predicate returns true to reject.
struct AdmissionCondition {
    reason: RejectReason,
    rejects: fn(&CheckSettings, &ReportView<'_>) -> bool,
}

static CONDITIONS: [AdmissionCondition; 14] = [
    AdmissionCondition { reason: RejectReason::MintAuthority, rejects: mint_authority },
    AdmissionCondition { reason: RejectReason::NotInitialized, rejects: not_initialized },
    AdmissionCondition { reason: RejectReason::FreezeAuthority, rejects: freeze_authority },
    AdmissionCondition { reason: RejectReason::Mutable, rejects: mutable },
    AdmissionCondition { reason: RejectReason::InsiderHolders, rejects: insider_holders },
    AdmissionCondition { reason: RejectReason::HolderConcentration, rejects: holder_concentration },
    AdmissionCondition { reason: RejectReason::TooFewLpProviders, rejects: too_few_lp_providers },
    AdmissionCondition { reason: RejectReason::TooFewMarkets, rejects: too_few_markets },
    AdmissionCondition { reason: RejectReason::Rugged, rejects: rugged },
    AdmissionCondition { reason: RejectReason::ScoreTooHigh, rejects: score_too_high },
    AdmissionCondition { reason: RejectReason::BlockedSymbol, rejects: blocked_symbol },
    AdmissionCondition { reason: RejectReason::BlockedName, rejects: blocked_name },
    AdmissionCondition { reason: RejectReason::EndsWithPump, rejects: ends_with_pump },
    AdmissionCondition { reason: RejectReason::LowMarketLiquidity, rejects: low_market_liquidity },
];

fn mint_authority(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    !s.allow_mint_authority && v.report.token.mint_authority.is_some()
}

fn not_initialized(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    !s.allow_not_initialized && !v.report.token.is_initialized
}

fn freeze_authority(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    !s.allow_freeze_authority && v.report.token.freeze_authority.is_some()
}

fn mutable(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    !s.allow_mutable && v.report.token_meta.mutable != Some(false)
}

fn insider_holders(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    !s.allow_insider_topholders && v.holders.iter().any(|h| h.insider)
}

fn holder_concentration(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    v.holders.iter().any(|h| h.pct > s.max_allowed_pct_topholders)
}

fn too_few_lp_providers(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    v.report.total_lp_providers < s.min_total_lp_providers
}

fn too_few_markets(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    (v.report.markets().len() as u64) < s.min_total_markets
}

fn rugged(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    !s.allow_rugged && v.report.rugged
}

fn score_too_high(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    s.max_score > 0.0 && v.report.score > s.max_score
}

fn blocked_symbol(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    s.block_symbols.iter().any(|b| *b == v.report.token_meta.symbol)
}

fn blocked_name(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    s.block_names.iter().any(|b| *b == v.report.token_meta.name)
}

fn ends_with_pump(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    let meta = &v.report.token_meta;
    s.ignore_ends_with_pump
        && (meta.name.to_lowercase().ends_with("pump")
            || meta.symbol.to_lowercase().ends_with("pump"))
}

fn low_market_liquidity(s: &CheckSettings, v: &ReportView<'_>) -> bool {
    v.report
        .markets()
        .iter()
        .any(|m| m.liquidity.unwrap_or(0.0) < s.min_total_market_liquidity)
}

// --- Engine ---

pub struct AdmissionRuleEngine {
    settings: CheckSettings,
    reports: Arc<dyn ReportSource>,
    history: Arc<dyn HistoryStore>,
}

impl AdmissionRuleEngine {
    pub fn new(
        settings: CheckSettings,
        reports: Arc<dyn ReportSource>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            settings,
            reports,
            history,
        }
    }

    pub fn settings(&self) -> &CheckSettings {
        &self.settings
    }

    /// Fetch the report for `mint` and run the full evaluation.
    pub async fn check(&self, mint: &str) -> Admission {
        match self.fetch(mint).await {
            Some(report) => self.evaluate(mint, &report).await,
            None => Admission::Rejected(RejectReason::ReportUnavailable),
        }
    }

    /// Fetch the report for `mint` and apply only the authority conditions.
    pub async fn check_authorities(&self, mint: &str) -> Admission {
        let Some(report) = self.fetch(mint).await else {
            return Admission::Rejected(RejectReason::ReportUnavailable);
        };
        let view = self.view(&report);
        let failed = CONDITIONS
            .iter()
            .filter(|c| {
                matches!(
                    c.reason,
                    RejectReason::MintAuthority | RejectReason::FreezeAuthority
                )
            })
            .find(|c| (c.rejects)(&self.settings, &view));

        match failed {
            Some(c) => {
                info!(mint = %mint, reason = %c.reason, "token rejected");
                Admission::Rejected(c.reason)
            }
            None => Admission::Accepted,
        }
    }

    /// Evaluate `report` for `mint`: ordered conditions, then duplicate
    /// history. The token is recorded in history whatever the outcome.
    pub async fn evaluate(&self, mint: &str, report: &TokenReport) -> Admission {
        let name = report.token_meta.name.as_str();
        let creator = report.creator_or(mint);

        let mut verdict = match self.first_failed(report) {
            Some(reason) => Admission::Rejected(reason),
            None => Admission::Accepted,
        };

        if verdict.is_accepted() {
            if let Some(reason) = self.duplicate(mint, name, creator).await {
                verdict = Admission::Rejected(reason);
            }
        }

        self.record(mint, name, creator).await;

        match verdict {
            Admission::Accepted => info!(mint = %mint, name = %name, "token passed admission"),
            Admission::Rejected(reason) => {
                info!(mint = %mint, name = %name, reason = %reason, "token rejected")
            }
        }
        verdict
    }

    /// First condition in declared order that rejects `report`.
    pub fn first_failed(&self, report: &TokenReport) -> Option<RejectReason> {
        let view = self.view(report);
        CONDITIONS
            .iter()
            .find(|c| (c.rejects)(&self.settings, &view))
            .map(|c| c.reason)
    }

    fn view<'a>(&self, report: &'a TokenReport) -> ReportView<'a> {
        let holders = if self.settings.exclude_lp_from_topholders {
            let lp = report.liquidity_addresses();
            report
                .top_holders
                .iter()
                .filter(|h| !lp.contains(&h.address.as_str()))
                .collect()
        } else {
            report.top_holders.iter().collect()
        };
        ReportView { report, holders }
    }

    async fn fetch(&self, mint: &str) -> Option<TokenReport> {
        match self.reports.fetch_report(mint).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(mint = %mint, error = %e, "report fetch failed");
                None
            }
        }
    }

    async fn duplicate(&self, mint: &str, name: &str, creator: &str) -> Option<RejectReason> {
        if !self.settings.duplicate_detection() {
            return None;
        }
        let records = match self.history.find(name, creator).await {
            Ok(records) => records,
            Err(e) => {
                warn!(mint = %mint, error = %e, "history lookup failed, skipping duplicate check");
                return None;
            }
        };

        if self.settings.block_returning_token_names && records.iter().any(|r| r.name == name) {
            return Some(RejectReason::DuplicateName);
        }
        if self.settings.block_returning_token_creators && records.iter().any(|r| r.creator == creator) {
            return Some(RejectReason::DuplicateCreator);
        }
        None
    }

    async fn record(&self, mint: &str, name: &str, creator: &str) {
        let record = HistoryRecord::now(mint, name, creator);
        if let Err(e) = self.history.insert(&record).await {
            if self.settings.duplicate_detection() {
                error!(mint = %mint, error = %e, "failed to record token history");
            } else {
                debug!(mint = %mint, error = %e, "failed to record token history");
            }
        }
    }
}
