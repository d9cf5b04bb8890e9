use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::admission::CheckSettings;
use crate::sniper::CheckMode;
use crate::ws::subscription::Subscription;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("{name} must start with {expected}, got {value:?}")]
    InvalidUrl {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("subscription {0:?} is enabled with an empty instruction")]
    EmptyInstruction(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default = "default_subscriptions")]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub checks: CheckSettings,
    #[serde(default)]
    pub buy: BuyConfig,
    #[serde(default)]
    pub sell: SellConfig,
    #[serde(default)]
    pub rugcheck: RugCheckConfig,
    #[serde(default)]
    pub sniperoo: SniperooConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub valkey: ValkeyConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// Websocket endpoint for `logsSubscribe` - env SOLANA_WSS_URL
    #[serde(default)]
    pub wss_url: String,
    /// HTTP endpoint for `getTransaction` - env SOLANA_HTTPS_URL
    #[serde(default)]
    pub https_url: String,
    /// Commitment level requested on log subscriptions.
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Reconnect budget. Absent means retry forever.
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of signatures being resolved/checked at once.
    #[serde(default = "default_concurrent")]
    pub concurrent_transactions: usize,
    /// Counter-asset mint ignored when picking the new token out of a pool.
    #[serde(default = "default_reference_mint")]
    pub reference_mint: String,
    #[serde(default)]
    pub check_mode: CheckMode,
    /// Run every check but never call the buy endpoint.
    #[serde(default)]
    pub simulation_mode: bool,
    /// Pause before rebuilding the connection after the retry budget runs out.
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_resolver_retries")]
    pub max_retries: u32,
    #[serde(default = "default_resolver_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyConfig {
    /// SOL spent per accepted token.
    #[serde(default = "default_buy_amount")]
    pub amount_sol: f64,
    /// Ring the terminal bell after a successful buy.
    #[serde(default = "default_true")]
    pub play_sound: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SellConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_stop_loss")]
    pub stop_loss_percent: f64,
    #[serde(default = "default_take_profit")]
    pub take_profit_percent: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RugCheckConfig {
    #[serde(default = "default_rugcheck_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SniperooConfig {
    #[serde(default = "default_sniperoo_url")]
    pub base_url: String,
    /// Bearer token - loaded from env SNIPEROO_API_KEY
    #[serde(default)]
    pub api_key: String,
    /// Wallet used for buys - loaded from env SNIPEROO_PUBKEY
    #[serde(default)]
    pub pubkey: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelegramConfig {
    /// Loaded from env TELEGRAM_BOT_TOKEN
    #[serde(default)]
    pub bot_token: String,
    /// Loaded from env TELEGRAM_CHAT_ID
    #[serde(default)]
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValkeyConfig {
    /// Empty keeps token history in memory only.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_valkey_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_commitment() -> String {
    "processed".to_string()
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_concurrent() -> usize {
    1
}
fn default_reference_mint() -> String {
    crate::onchain::WSOL_MINT.to_string()
}
fn default_restart_delay_secs() -> u64 {
    5
}
fn default_resolver_retries() -> u32 {
    3
}
fn default_resolver_delay_ms() -> u64 {
    2000
}
fn default_buy_amount() -> f64 {
    0.05
}
fn default_stop_loss() -> f64 {
    15.0
}
fn default_take_profit() -> f64 {
    30.0
}
fn default_rugcheck_url() -> String {
    "https://api.rugcheck.xyz".to_string()
}
fn default_sniperoo_url() -> String {
    "https://api.sniperoo.app".to_string()
}
fn default_valkey_prefix() -> String {
    "poolsnipe".to_string()
}
fn default_http_timeout_ms() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

fn default_subscriptions() -> Vec<Subscription> {
    vec![
        Subscription {
            id: "pump1".to_string(),
            name: "pumpswap".to_string(),
            program: "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P".to_string(),
            instruction: "Program log: Instruction: CreatePool".to_string(),
            enabled: true,
        },
        Subscription {
            id: "rad1".to_string(),
            name: "Raydium".to_string(),
            program: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8".to_string(),
            instruction: "Program log: initialize2: InitializeInstruction2".to_string(),
            enabled: false,
        },
    ]
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            wss_url: String::new(),
            https_url: String::new(),
            commitment: default_commitment(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_retries: None,
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrent_transactions: default_concurrent(),
            reference_mint: default_reference_mint(),
            check_mode: CheckMode::default(),
            simulation_mode: false,
            restart_delay_secs: default_restart_delay_secs(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_retries: default_resolver_retries(),
            retry_delay_ms: default_resolver_delay_ms(),
        }
    }
}

impl Default for BuyConfig {
    fn default() -> Self {
        Self {
            amount_sol: default_buy_amount(),
            play_sound: true,
        }
    }
}

impl Default for SellConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stop_loss_percent: default_stop_loss(),
            take_profit_percent: default_take_profit(),
        }
    }
}

impl Default for RugCheckConfig {
    fn default() -> Self {
        Self {
            base_url: default_rugcheck_url(),
        }
    }
}

impl Default for SniperooConfig {
    fn default() -> Self {
        Self {
            base_url: default_sniperoo_url(),
            api_key: String::new(),
            pubkey: String::new(),
        }
    }
}

impl Default for ValkeyConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            prefix: default_valkey_prefix(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl ConnectionConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML document without touching the environment.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Defaults plus whatever the environment provides (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.subscriptions = default_subscriptions();
        config.apply_env();
        config
    }

    // Secrets and endpoints never need to live in the config file.
    fn apply_env(&mut self) {
        let overlay = |target: &mut String, var: &str| {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *target = value;
                }
            }
        };
        overlay(&mut self.rpc.wss_url, "SOLANA_WSS_URL");
        overlay(&mut self.rpc.https_url, "SOLANA_HTTPS_URL");
        overlay(&mut self.sniperoo.api_key, "SNIPEROO_API_KEY");
        overlay(&mut self.sniperoo.pubkey, "SNIPEROO_PUBKEY");
        overlay(&mut self.telegram.bot_token, "TELEGRAM_BOT_TOKEN");
        overlay(&mut self.telegram.chat_id, "TELEGRAM_CHAT_ID");
        overlay(&mut self.valkey.url, "VALKEY_URL");
    }

    /// Check the endpoints the pipeline cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.wss_url.is_empty() {
            return Err(ConfigError::MissingEnv("SOLANA_WSS_URL".to_string()));
        }
        if self.rpc.https_url.is_empty() {
            return Err(ConfigError::MissingEnv("SOLANA_HTTPS_URL".to_string()));
        }
        if !self.rpc.wss_url.starts_with("ws://") && !self.rpc.wss_url.starts_with("wss://") {
            return Err(ConfigError::InvalidUrl {
                name: "SOLANA_WSS_URL",
                expected: "ws:// or wss://",
                value: self.rpc.wss_url.clone(),
            });
        }
        if !self.rpc.https_url.starts_with("http://") && !self.rpc.https_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidUrl {
                name: "SOLANA_HTTPS_URL",
                expected: "http:// or https://",
                value: self.rpc.https_url.clone(),
            });
        }
        // An empty match text is a substring of every log line.
        if let Some(sub) = self
            .subscriptions
            .iter()
            .find(|s| s.enabled && s.instruction.trim().is_empty())
        {
            return Err(ConfigError::EmptyInstruction(sub.id.clone()));
        }
        Ok(())
    }

    pub fn has_sniperoo_credentials(&self) -> bool {
        !self.sniperoo.api_key.is_empty() && !self.sniperoo.pubkey.is_empty()
    }

    pub fn has_telegram(&self) -> bool {
        !self.telegram.bot_token.is_empty() && !self.telegram.chat_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.connection.initial_backoff_ms, 1000);
        assert_eq!(config.connection.max_backoff_ms, 30_000);
        assert_eq!(config.connection.max_retries, None);
        assert_eq!(config.pipeline.concurrent_transactions, 1);
        assert_eq!(config.pipeline.check_mode, CheckMode::Full);
        assert_eq!(config.resolver.max_retries, 3);
        assert_eq!(config.resolver.retry_delay_ms, 2000);
        assert_eq!(config.rpc.commitment, "processed");
        assert_eq!(config.subscriptions.len(), 2);
        assert!(config.subscriptions[0].enabled);
        assert!(!config.subscriptions[1].enabled);
        assert_eq!(config.checks.max_allowed_pct_topholders, 50.0);
        assert!(config.checks.block_returning_token_names);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = Config::parse(
            r#"
            [connection]
            max_retries = 4
            initial_backoff_ms = 250

            [pipeline]
            concurrent_transactions = 3
            check_mode = "snipe"
            simulation_mode = true

            [checks]
            allow_mint_authority = true
            block_symbols = ["SCAM"]
            max_score = 0

            [[subscriptions]]
            id = "pump1"
            name = "pumpswap"
            program = "prog"
            instruction = "Instruction: CreatePool"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.max_retries, Some(4));
        assert_eq!(config.connection.initial_backoff(), Duration::from_millis(250));
        assert_eq!(config.pipeline.concurrent_transactions, 3);
        assert_eq!(config.pipeline.check_mode, CheckMode::Snipe);
        assert!(config.pipeline.simulation_mode);
        assert!(config.checks.allow_mint_authority);
        assert_eq!(config.checks.block_symbols, vec!["SCAM".to_string()]);
        assert_eq!(config.checks.max_score, 0.0);
        // untouched keys in a present section still default
        assert!(!config.checks.allow_freeze_authority);
        assert_eq!(config.subscriptions.len(), 1);
        assert!(config.subscriptions[0].enabled);
    }

    #[test]
    fn test_validate_rejects_bad_schemes() {
        let mut config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingEnv(_))));

        config.rpc.wss_url = "https://rpc.example".to_string();
        config.rpc.https_url = "https://rpc.example".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { name: "SOLANA_WSS_URL", .. })
        ));

        config.rpc.wss_url = "wss://rpc.example".to_string();
        config.rpc.https_url = "ftp://rpc.example".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { name: "SOLANA_HTTPS_URL", .. })
        ));

        config.rpc.https_url = "https://rpc.example".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_instruction_when_enabled() {
        let mut config = Config::parse(
            r#"
            [rpc]
            wss_url = "wss://rpc.example"
            https_url = "https://rpc.example"

            [[subscriptions]]
            id = "pump1"
            program = "pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA"
            instruction = ""
            enabled = false
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());

        config.subscriptions[0].enabled = true;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyInstruction(id)) if id == "pump1"
        ));

        config.subscriptions[0].instruction = "Instruction: CreatePool".to_string();
        assert!(config.validate().is_ok());
    }
}
