//! Configuration types for the oracle sidecar

use crate::marketmap::DEFAULT_FAILOVER_THRESHOLD;
use crate::provider::ProviderKind;
use crate::telemetry::LogFormat;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub market_map: MarketMapConfig,
    #[serde(default)]
    pub providers: Vec<ProviderEndpointConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Statistic used to combine contributions for one pair
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    Median,
    Vwap,
    Tvwap,
}

/// Aggregation loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Period of the collect-and-aggregate pass
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Observations older than this are excluded
    #[serde(default = "default_max_price_age_ms")]
    pub max_price_age_ms: u64,

    #[serde(default)]
    pub aggregation: AggregationMethod,

    /// Lookback window for TVWAP
    #[serde(default = "default_tvwap_window_ms")]
    pub tvwap_window_ms: u64,
}

fn default_update_interval_ms() -> u64 {
    250
}
fn default_max_price_age_ms() -> u64 {
    120_000
}
fn default_tvwap_window_ms() -> u64 {
    60_000
}

/// Longest accepted TVWAP lookback (one week)
pub const MAX_TVWAP_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            max_price_age_ms: default_max_price_age_ms(),
            aggregation: AggregationMethod::Median,
            tvwap_window_ms: default_tvwap_window_ms(),
        }
    }
}

impl OracleConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn max_price_age(&self) -> Duration {
        Duration::from_millis(self.max_price_age_ms)
    }

    pub fn tvwap_window(&self) -> Duration {
        Duration::from_millis(self.tvwap_window_ms)
    }
}

/// Market map source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MarketMapConfig {
    /// Map loaded before providers are built
    #[serde(default)]
    pub initial_path: Option<PathBuf>,

    /// HTTP endpoint polled for updates; enables the synchronizer
    #[serde(default)]
    pub fetch_url: Option<String>,

    /// Secondary endpoint; wraps the fetcher in a failover
    #[serde(default)]
    pub fallback_url: Option<String>,

    /// Extra endpoint whose markets are unioned in; the main source wins
    /// on key collisions
    #[serde(default)]
    pub merge_url: Option<String>,

    #[serde(default = "default_chain_id")]
    pub chain_id: String,

    #[serde(default = "default_market_map_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Where the last applied map is written
    #[serde(default)]
    pub persist_path: Option<PathBuf>,

    #[serde(default = "default_failover_threshold")]
    pub failover_threshold: u32,
}

fn default_chain_id() -> String {
    "oracle-1".to_string()
}
fn default_market_map_interval_ms() -> u64 {
    1_000
}
fn default_fetch_timeout_ms() -> u64 {
    5_000
}
fn default_failover_threshold() -> u32 {
    DEFAULT_FAILOVER_THRESHOLD
}

impl Default for MarketMapConfig {
    fn default() -> Self {
        Self {
            initial_path: None,
            fetch_url: None,
            fallback_url: None,
            merge_url: None,
            chain_id: default_chain_id(),
            update_interval_ms: default_market_map_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            persist_path: None,
            failover_threshold: default_failover_threshold(),
        }
    }
}

impl MarketMapConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Endpoint configuration for one data source.
///
/// Only the provider factory reads anything past `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpointConfig {
    pub name: String,

    pub kind: ProviderKind,

    /// Base URL; the source's public endpoint when omitted
    #[serde(default)]
    pub url: Option<String>,

    /// Poll period for REST sources
    #[serde(default = "default_provider_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,

    /// Largest subscription set the source accepts
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions: usize,

    /// WebSocket reconnect budget (0 = infinite)
    #[serde(default)]
    pub max_reconnects: u32,
}

fn default_provider_interval_ms() -> u64 {
    1_000
}
fn default_provider_timeout_ms() -> u64 {
    5_000
}
fn default_max_subscriptions() -> usize {
    1_024
}

impl ProviderEndpointConfig {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            url: None,
            interval_ms: default_provider_interval_ms(),
            timeout_ms: default_provider_timeout_ms(),
            max_subscriptions: default_max_subscriptions(),
            max_reconnects: 0,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; no exporter when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.oracle.update_interval_ms == 0 {
            anyhow::bail!("oracle.update_interval_ms must be positive");
        }
        if self.oracle.tvwap_window_ms > MAX_TVWAP_WINDOW_MS {
            anyhow::bail!(
                "oracle.tvwap_window_ms must not exceed {MAX_TVWAP_WINDOW_MS}, got {}",
                self.oracle.tvwap_window_ms
            );
        }
        if self.market_map.update_interval_ms == 0 {
            anyhow::bail!("market_map.update_interval_ms must be positive");
        }
        if self.market_map.fallback_url.is_some() && self.market_map.fetch_url.is_none() {
            anyhow::bail!("market_map.fallback_url requires market_map.fetch_url");
        }
        if self.market_map.merge_url.is_some() && self.market_map.fetch_url.is_none() {
            anyhow::bail!("market_map.merge_url requires market_map.fetch_url");
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                anyhow::bail!("provider name must not be empty");
            }
            if !seen.insert(provider.name.as_str()) {
                anyhow::bail!("provider {} configured twice", provider.name);
            }
            if provider.interval_ms == 0 {
                anyhow::bail!("provider {}: interval_ms must be positive", provider.name);
            }
        }
        Ok(())
    }
}
