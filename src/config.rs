//! Configuration types for digit-trader

use crate::analyzer::AnalyzerConfig;
use crate::execution::ContractType;
use crate::orchestrator::SingleFlightScope;
use crate::protocol::{ProtocolConfig, RetryPolicy};
use crate::risk::{RiskLimits, StakingConfig};
use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors; any of them stops startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub venue: VenueConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub risk: RiskLimits,
    #[serde(default)]
    pub staking: StakingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Venue connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// WebSocket endpoint
    pub url: String,

    /// Application id appended to the endpoint as `app_id`
    #[serde(default)]
    pub app_id: Option<u32>,

    /// API token (prefer `token_env`)
    #[serde(default)]
    pub token: Option<String>,

    /// Environment variable holding the API token
    #[serde(default)]
    pub token_env: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,

    /// Reconnect attempts before giving up (0 = infinite)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_rate_limit_delay_secs")]
    pub rate_limit_delay_secs: u64,

    #[serde(default = "default_unavailable_delay_secs")]
    pub unavailable_delay_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_request_timeout_secs() -> u64 {
    30
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_reconnect_base_ms() -> u64 {
    1_000
}
fn default_reconnect_cap_ms() -> u64 {
    30_000
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_rate_limit_delay_secs() -> u64 {
    5
}
fn default_unavailable_delay_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

impl VenueConfig {
    /// Endpoint with the app id query applied
    pub fn endpoint(&self) -> String {
        match self.app_id {
            Some(app_id) if self.url.contains('?') => format!("{}&app_id={}", self.url, app_id),
            Some(app_id) => format!("{}?app_id={}", self.url, app_id),
            None => self.url.clone(),
        }
    }

    /// Token from config, else from `token_env`
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| {
                self.token_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
            })
            .filter(|t| !t.is_empty())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            rate_limit_delay: Duration::from_secs(self.rate_limit_delay_secs),
            unavailable_delay: Duration::from_secs(self.unavailable_delay_secs),
            max_retries: self.max_retries,
        }
    }

    /// Protocol client settings for this venue
    pub fn protocol_config(&self) -> ProtocolConfig {
        let mut config = ProtocolConfig::new(self.endpoint())
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .heartbeat_interval(Duration::from_secs(self.heartbeat_secs))
            .reconnect(
                Duration::from_millis(self.reconnect_base_ms),
                Duration::from_millis(self.reconnect_cap_ms),
                self.max_reconnect_attempts,
            )
            .retry_policy(self.retry_policy());
        if let Some(token) = self.resolve_token() {
            config = config.token(token);
        }
        config
    }
}

/// Trading loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Instruments to trade
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_contract_type")]
    pub contract_type: ContractType,

    /// Contract length in ticks
    #[serde(default = "default_duration_ticks")]
    pub duration_ticks: u32,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Digits kept per instrument
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Ticks requested at start to seed each history
    #[serde(default = "default_history_size")]
    pub backfill_count: usize,

    #[serde(default)]
    pub single_flight: SingleFlightScope,

    /// Cooldown bounds after a settlement (milliseconds)
    #[serde(default = "default_min_wait_ms")]
    pub min_wait_ms: u64,

    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Cooldown multiplier after a loss
    #[serde(default = "default_loss_wait_multiplier")]
    pub loss_wait_multiplier: f64,

    /// Suspended instruments allowed at once (0 = unlimited)
    #[serde(default)]
    pub max_suspended_instruments: usize,

    /// Failed re-tracks before an in-flight trade is abandoned
    #[serde(default = "default_max_unconfirmed_reconnects")]
    pub max_unconfirmed_reconnects: u32,

    /// Time without a settlement before a contract is re-checked
    #[serde(default = "default_contract_timeout_secs")]
    pub contract_timeout_secs: u64,
}

fn default_symbols() -> Vec<String> {
    vec!["R_100".to_string()]
}
fn default_contract_type() -> ContractType {
    ContractType::DigitDiff
}
fn default_duration_ticks() -> u32 {
    1
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_history_size() -> usize {
    100
}
fn default_min_wait_ms() -> u64 {
    2_000
}
fn default_max_wait_ms() -> u64 {
    5_000
}
fn default_loss_wait_multiplier() -> f64 {
    2.0
}
fn default_max_unconfirmed_reconnects() -> u32 {
    3
}
fn default_contract_timeout_secs() -> u64 {
    60
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            contract_type: default_contract_type(),
            duration_ticks: default_duration_ticks(),
            currency: default_currency(),
            history_size: default_history_size(),
            backfill_count: default_history_size(),
            single_flight: SingleFlightScope::default(),
            min_wait_ms: default_min_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
            loss_wait_multiplier: default_loss_wait_multiplier(),
            max_suspended_instruments: 0,
            max_unconfirmed_reconnects: default_max_unconfirmed_reconnects(),
            contract_timeout_secs: default_contract_timeout_secs(),
        }
    }
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Paper,
    Live,
}

/// Execution engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Starting balance of the simulated account
    #[serde(default = "default_paper_balance")]
    pub paper_balance: Decimal,

    /// Profit fraction of the stake on a simulated win
    #[serde(default = "default_paper_payout_rate")]
    pub paper_payout_rate: Decimal,
}

fn default_paper_balance() -> Decimal {
    Decimal::new(1000, 0)
}
fn default_paper_payout_rate() -> Decimal {
    Decimal::new(95, 3) // 0.095
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Paper,
            paper_balance: default_paper_balance(),
            paper_payout_rate: default_paper_payout_rate(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Prometheus listener port; no exporter when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: None,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Strategy state persistence
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// JSON state file; nothing is persisted when absent
    #[serde(default = "default_store_path")]
    pub path: Option<PathBuf>,
}

fn default_store_path() -> Option<PathBuf> {
    Some(PathBuf::from("state/strategy.json"))
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let venue = &self.venue;
        if !(venue.url.starts_with("ws://") || venue.url.starts_with("wss://")) {
            return Err(invalid(format!("venue.url must be a ws:// or wss:// URL, got {:?}", venue.url)));
        }
        if venue.request_timeout_secs == 0 {
            return Err(invalid("venue.request_timeout_secs must be positive"));
        }
        if venue.reconnect_base_ms == 0 || venue.reconnect_base_ms > venue.reconnect_cap_ms {
            return Err(invalid("venue.reconnect_base_ms must be positive and at most reconnect_cap_ms"));
        }

        let trading = &self.trading;
        if trading.symbols.is_empty() || trading.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(invalid("trading.symbols must list at least one non-empty symbol"));
        }
        if trading.duration_ticks == 0 {
            return Err(invalid("trading.duration_ticks must be at least 1"));
        }
        if trading.min_wait_ms > trading.max_wait_ms {
            return Err(invalid("trading.min_wait_ms must not exceed max_wait_ms"));
        }
        if !trading.loss_wait_multiplier.is_finite() || trading.loss_wait_multiplier < 0.0 {
            return Err(invalid("trading.loss_wait_multiplier must be a non-negative number"));
        }
        if trading.history_size < self.analyzer.min_history_length {
            return Err(invalid(format!(
                "trading.history_size ({}) is below analyzer.min_history_length ({})",
                trading.history_size, self.analyzer.min_history_length
            )));
        }

        let analyzer = &self.analyzer;
        if !(0.0..=1.0).contains(&analyzer.min_confidence) {
            return Err(invalid("analyzer.min_confidence must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&analyzer.max_repetition_rate) {
            return Err(invalid("analyzer.max_repetition_rate must be within [0, 1]"));
        }
        if analyzer.weights.total() <= 0.0 {
            return Err(invalid("analyzer.weights must sum to a positive value"));
        }

        let risk = &self.risk;
        if risk.min_stake <= Decimal::ZERO || risk.min_stake > risk.max_stake {
            return Err(invalid("risk.min_stake must be positive and at most max_stake"));
        }
        if risk.stake_granularity <= Decimal::ZERO {
            return Err(invalid("risk.stake_granularity must be positive"));
        }
        if risk.position_size_pct <= Decimal::ZERO || risk.position_size_pct > Decimal::ONE {
            return Err(invalid("risk.position_size_pct must be within (0, 1]"));
        }
        if risk.max_drawdown_pct <= Decimal::ZERO || risk.max_drawdown_pct > Decimal::ONE {
            return Err(invalid("risk.max_drawdown_pct must be within (0, 1]"));
        }
        if risk.max_concurrent_trades == 0 {
            return Err(invalid("risk.max_concurrent_trades must be at least 1"));
        }

        if self.staking.base_stake <= Decimal::ZERO {
            return Err(invalid("staking.base_stake must be positive"));
        }
        if self.staking.loss_multiplier < Decimal::ONE {
            return Err(invalid("staking.loss_multiplier must be at least 1"));
        }

        match self.execution.mode {
            ExecutionMode::Live if self.venue.resolve_token().is_none() => {
                return Err(invalid("live execution needs venue.token or venue.token_env"));
            }
            ExecutionMode::Paper if self.execution.paper_balance <= Decimal::ZERO => {
                return Err(invalid("execution.paper_balance must be positive"));
            }
            _ => {}
        }

        Ok(())
    }
}
