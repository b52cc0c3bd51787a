//! Configuration management for the sentinel.
//!
//! Loads a YAML document, substitutes `${ENV_NAME}` placeholders from the
//! process environment, then applies environment overrides. A missing
//! placeholder env is fatal. Keys are matched case-insensitively because
//! environment overrides arrive lowercased.

use alloy::primitives::{Address, U256};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{SentinelError, SentinelResult};

/// Default health probe port, overridable via `HEALTH_PORT`.
const DEFAULT_HEALTH_PORT: u16 = 3000;
/// Default dashboard API port, overridable via `API_PORT`.
const DEFAULT_API_PORT: u16 = 4000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Chain endpoints
    pub chain: ChainConfig,
    /// Off-chain project catalog
    pub virtuals: VirtualsConfig,
    /// Watched on-chain addresses
    pub addresses: AddressConfig,
    /// Monitoring thresholds
    pub thresholds: ThresholdConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Health probe port (env `HEALTH_PORT`)
    #[serde(skip)]
    pub health_port: u16,
    /// Dashboard API port (env `API_PORT`)
    #[serde(skip)]
    pub api_port: u16,
}

/// Chain identity and endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Numeric chain id; defaults to Base mainnet
    #[serde(default = "default_chain_id")]
    pub id: u64,
    /// Human-readable chain name
    #[serde(default = "default_chain_name")]
    pub name: String,
    pub rpc: RpcEndpoints,
}

fn default_chain_id() -> u64 {
    8453
}

fn default_chain_name() -> String {
    "base".to_string()
}

/// Ordered endpoint lists; the first entry of each is the preferred one.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcEndpoints {
    /// HTTP request endpoints, rotated on failure
    pub http: Vec<String>,
    /// WebSocket push endpoints
    pub wss: Vec<String>,
}

/// Project catalog configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VirtualsConfig {
    /// Catalog API base URL
    #[serde(alias = "apiBase", alias = "apibase")]
    pub api_base: String,
    /// Discovery poll interval in milliseconds
    #[serde(
        alias = "pollIntervalMs",
        alias = "pollintervalms",
        default = "default_poll_interval_ms"
    )]
    pub poll_interval_ms: u64,
    /// Oldest project age considered by discovery, in minutes
    #[serde(
        alias = "maxProjectAgeMinutes",
        alias = "maxprojectageminutes",
        default = "default_max_project_age"
    )]
    pub max_project_age_minutes: u64,
    /// Ticker that wins ties during selection
    #[serde(alias = "preferredTicker", alias = "preferredticker", default)]
    pub preferred_ticker: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_max_project_age() -> u64 {
    12 * 60
}

/// Watched addresses
#[derive(Debug, Clone, Deserialize)]
pub struct AddressConfig {
    /// Fee receiver / buyback wallet
    #[serde(alias = "buybackAddr", alias = "buybackaddr")]
    pub buyback_addr: Address,
    /// Base accounting token (18 decimals)
    #[serde(alias = "virtualToken", alias = "virtualtoken")]
    pub virtual_token: Address,
}

/// Monitoring thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    /// Whale trade threshold, display units of the base token
    #[serde(alias = "bigTradeVirtual", alias = "bigtradevirtual")]
    pub big_trade_virtual: String,
    /// Tax collection window length
    #[serde(
        alias = "taxWindowMinutes",
        alias = "taxwindowminutes",
        default = "default_tax_window"
    )]
    pub tax_window_minutes: u64,
    /// Sliding window for the buyback spend rate
    #[serde(
        alias = "buybackRateWindowMinutes",
        alias = "buybackratewindowminutes",
        default = "default_rate_window"
    )]
    pub buyback_rate_window_minutes: u64,
    /// Minutes without a spend before a stall alert fires
    #[serde(
        alias = "stallAlertMinutes",
        alias = "stallalertminutes",
        default = "default_stall_alert"
    )]
    pub stall_alert_minutes: u64,
}

fn default_tax_window() -> u64 {
    100
}

fn default_rate_window() -> u64 {
    20
}

fn default_stall_alert() -> u64 {
    30
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ThresholdConfig {
    /// Whale threshold in integer base units.
    pub fn big_trade_base_units(&self) -> SentinelResult<U256> {
        crate::rpc::contracts::parse_units(&self.big_trade_virtual, 18)
            .map_err(|e| SentinelError::Config(format!("thresholds.bigTradeVirtual: {}", e)))
    }

    pub fn tax_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.tax_window_minutes as i64)
    }

    pub fn rate_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.buyback_rate_window_minutes as i64)
    }

    pub fn stall_alert(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stall_alert_minutes as i64)
    }
}

impl VirtualsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl AppConfig {
    /// Load configuration from `CONFIG_PATH` (default `config.yaml`).
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (`SENTINEL_*`, `__` as separator)
    /// 2. The YAML document, after `${ENV}` substitution
    /// 3. Default values
    pub fn load() -> SentinelResult<Self> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| SentinelError::Config(format!("cannot read {}: {}", path, e)))?;
        let substituted = substitute_env(&raw)?;

        let config = Config::builder()
            .add_source(File::from_str(&substituted, FileFormat::Yaml))
            .add_source(
                Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: AppConfig = config.try_deserialize().map_err(SentinelError::from)?;
        app.health_port = port_from_env("HEALTH_PORT", DEFAULT_HEALTH_PORT)?;
        app.api_port = port_from_env("API_PORT", DEFAULT_API_PORT)?;
        app.validate()?;
        Ok(app)
    }

    /// Validate configuration values
    pub fn validate(&self) -> SentinelResult<()> {
        if self.chain.rpc.http.is_empty() {
            return Err(SentinelError::Config(
                "chain.rpc.http must list at least one endpoint".to_string(),
            ));
        }
        if self.chain.rpc.wss.is_empty() {
            return Err(SentinelError::Config(
                "chain.rpc.wss must list at least one endpoint".to_string(),
            ));
        }
        if self.virtuals.api_base.is_empty() {
            return Err(SentinelError::Config(
                "virtuals.apiBase must be set".to_string(),
            ));
        }
        if self.thresholds.tax_window_minutes == 0 {
            return Err(SentinelError::Config(
                "thresholds.taxWindowMinutes must be positive".to_string(),
            ));
        }
        if self.thresholds.buyback_rate_window_minutes == 0 {
            return Err(SentinelError::Config(
                "thresholds.buybackRateWindowMinutes must be positive".to_string(),
            ));
        }
        // Parse once at startup so a malformed threshold fails fast.
        self.thresholds.big_trade_base_units()?;
        Ok(())
    }
}

fn port_from_env(name: &str, default: u16) -> SentinelResult<u16> {
    match std::env::var(name) {
        Ok(v) => v
            .parse::<u16>()
            .map_err(|_| SentinelError::Config(format!("{} must be a port number, got {:?}", name, v))),
        Err(_) => Ok(default),
    }
}

/// Substitute `${ENV_NAME}` placeholders with process environment values.
///
/// A placeholder naming an unset variable is a configuration error.
pub fn substitute_env(raw: &str) -> SentinelResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            SentinelError::Config("unterminated ${...} placeholder in config".to_string())
        })?;
        let name = &after[..end];
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(SentinelError::Config(format!(
                "invalid env placeholder name: {:?}",
                name
            )));
        }
        let value = std::env::var(name).map_err(|_| {
            SentinelError::Config(format!("config references unset env var {}", name))
        })?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_env_passthrough() {
        assert_eq!(substitute_env("plain: value").unwrap(), "plain: value");
    }

    #[test]
    fn test_substitute_env_replaces() {
        std::env::set_var("SENTINEL_TEST_KEY", "abc123");
        let out = substitute_env("url: https://rpc/${SENTINEL_TEST_KEY}").unwrap();
        assert_eq!(out, "url: https://rpc/abc123");
    }

    #[test]
    fn test_substitute_env_missing_is_fatal() {
        let err = substitute_env("k: ${SENTINEL_DEFINITELY_UNSET_VAR}").unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_substitute_env_rejects_unterminated() {
        assert!(substitute_env("k: ${OOPS").is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_tax_window(), 100);
        assert_eq!(default_poll_interval_ms(), 15_000);
        assert_eq!(default_log_level(), "info");
    }
}
