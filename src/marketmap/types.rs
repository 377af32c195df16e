//! Market map types, validation and repair

use crate::types::{CurrencyPair, PairError, ProviderTicker};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use thiserror::Error;

/// Upper bound on a ticker's decimal precision
pub const MAX_DECIMALS: u32 = 36;

/// Market map validation and loading errors
#[derive(Debug, Error)]
pub enum MarketMapError {
    /// Ticker's currency pair is malformed
    #[error("invalid currency pair for market {key}: {source}")]
    InvalidPair {
        key: String,
        #[source]
        source: PairError,
    },
    /// Map key does not match the ticker it holds
    #[error("market key {key} does not match ticker {ticker}")]
    KeyMismatch { key: String, ticker: String },
    /// Decimals outside the supported range
    #[error("ticker {ticker} has invalid decimals {decimals} (max {MAX_DECIMALS})")]
    InvalidDecimals { ticker: String, decimals: u32 },
    /// Minimum provider count must be at least one
    #[error("ticker {ticker} has a zero minimum provider count")]
    InvalidMinProviderCount { ticker: String },
    /// Market has fewer provider configs than it requires
    #[error("market {ticker} has {have} provider configs, needs at least {need}")]
    InsufficientProviders {
        ticker: String,
        have: usize,
        need: u32,
    },
    /// A provider config is missing required fields
    #[error("market {ticker} has an invalid provider config: {reason}")]
    InvalidProviderConfig { ticker: String, reason: String },
    /// The same provider appears twice in one market
    #[error("market {ticker} lists provider {provider} more than once")]
    DuplicateProvider { ticker: String, provider: String },
    /// Normalize-by pair is absent or disabled
    #[error("market {ticker} normalizes by {pair}, which is not an enabled market")]
    MissingNormalizeBy { ticker: String, pair: String },
    /// JSON encode/decode failure
    #[error("market map json error: {0}")]
    Json(#[from] serde_json::Error),
    /// Filesystem failure
    #[error("market map io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Canonical pair definition plus how it is reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub currency_pair: CurrencyPair,
    pub decimals: u32,
    pub min_provider_count: u32,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub metadata_json: String,
}

impl Ticker {
    pub fn new(currency_pair: CurrencyPair, decimals: u32, min_provider_count: u32) -> Self {
        Self {
            currency_pair,
            decimals,
            min_provider_count,
            enabled: true,
            metadata_json: String::new(),
        }
    }

    fn validate(&self, key: &str) -> Result<(), MarketMapError> {
        self.currency_pair
            .validate()
            .map_err(|source| MarketMapError::InvalidPair {
                key: key.to_string(),
                source,
            })?;

        let ticker = self.currency_pair.to_string();
        if key != ticker {
            return Err(MarketMapError::KeyMismatch {
                key: key.to_string(),
                ticker,
            });
        }
        if self.decimals > MAX_DECIMALS {
            return Err(MarketMapError::InvalidDecimals {
                ticker,
                decimals: self.decimals,
            });
        }
        if self.min_provider_count == 0 {
            return Err(MarketMapError::InvalidMinProviderCount { ticker });
        }
        Ok(())
    }
}

/// How one source prices one market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Source name, matching a configured provider
    pub name: String,
    /// The source's own spelling of the pair
    pub off_chain_ticker: String,
    /// Report the reciprocal of the source's price
    #[serde(default)]
    pub invert: bool,
    /// Derive the price through an intermediate pair (e.g. BTC/USDT x USDT/USD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize_by_pair: Option<CurrencyPair>,
    #[serde(default)]
    pub metadata_json: String,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, off_chain_ticker: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            off_chain_ticker: off_chain_ticker.into(),
            invert: false,
            normalize_by_pair: None,
            metadata_json: String::new(),
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn normalized_by(mut self, pair: CurrencyPair) -> Self {
        self.normalize_by_pair = Some(pair);
        self
    }

    /// The subscription this config asks of its provider
    pub fn provider_ticker(&self) -> ProviderTicker {
        ProviderTicker::new(self.off_chain_ticker.clone(), self.metadata_json.clone())
    }
}

/// A ticker together with the sources that price it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub ticker: Ticker,
    pub provider_configs: Vec<ProviderConfig>,
}

impl Market {
    pub fn new(ticker: Ticker, provider_configs: Vec<ProviderConfig>) -> Self {
        Self {
            ticker,
            provider_configs,
        }
    }

    fn validate(&self, key: &str) -> Result<(), MarketMapError> {
        self.ticker.validate(key)?;
        let ticker = key.to_string();

        let need = self.ticker.min_provider_count;
        if self.provider_configs.len() < need as usize {
            return Err(MarketMapError::InsufficientProviders {
                ticker,
                have: self.provider_configs.len(),
                need,
            });
        }

        let mut seen = HashSet::new();
        for config in &self.provider_configs {
            if config.name.trim().is_empty() {
                return Err(MarketMapError::InvalidProviderConfig {
                    ticker,
                    reason: "empty provider name".to_string(),
                });
            }
            if config.off_chain_ticker.trim().is_empty() {
                return Err(MarketMapError::InvalidProviderConfig {
                    ticker,
                    reason: format!("provider {} has an empty off-chain ticker", config.name),
                });
            }
            if let Some(pair) = &config.normalize_by_pair {
                pair.validate()
                    .map_err(|source| MarketMapError::InvalidPair {
                        key: key.to_string(),
                        source,
                    })?;
            }
            if !seen.insert(config.name.as_str()) {
                return Err(MarketMapError::DuplicateProvider {
                    ticker,
                    provider: config.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Mapping from pair string to market.
///
/// Backed by a `BTreeMap` so iteration order, equality and the persisted
/// JSON are all deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMap {
    #[serde(default)]
    pub markets: BTreeMap<String, Market>,
}

impl MarketMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from markets, keyed by each ticker's pair string
    pub fn from_markets(markets: impl IntoIterator<Item = Market>) -> Self {
        Self {
            markets: markets
                .into_iter()
                .map(|m| (m.ticker.currency_pair.to_string(), m))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn get(&self, pair: &CurrencyPair) -> Option<&Market> {
        self.markets.get(&pair.to_string())
    }

    /// Markets whose ticker is enabled
    pub fn enabled_markets(&self) -> impl Iterator<Item = &Market> {
        self.markets.values().filter(|m| m.ticker.enabled)
    }

    fn is_enabled(&self, pair: &CurrencyPair) -> bool {
        self.get(pair).map(|m| m.ticker.enabled).unwrap_or(false)
    }

    /// Every provider name referenced by any market
    pub fn provider_names(&self) -> BTreeSet<String> {
        self.markets
            .values()
            .flat_map(|m| m.provider_configs.iter().map(|c| c.name.clone()))
            .collect()
    }

    /// The deduplicated subscriptions a provider must serve, from enabled
    /// markets only
    pub fn provider_tickers(&self, provider: &str) -> Vec<ProviderTicker> {
        self.enabled_markets()
            .flat_map(|m| m.provider_configs.iter())
            .filter(|c| c.name == provider)
            .map(ProviderConfig::provider_ticker)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Strict structural validation
    pub fn validate(&self) -> Result<(), MarketMapError> {
        for (key, market) in &self.markets {
            market.validate(key)?;

            for config in &market.provider_configs {
                if let Some(pair) = &config.normalize_by_pair {
                    if !self.is_enabled(pair) {
                        return Err(MarketMapError::MissingNormalizeBy {
                            ticker: key.clone(),
                            pair: pair.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Repair the map by pruning unresolvable entries, then validate what is
    /// left.
    ///
    /// Provider configs whose normalize-by pair is absent or disabled are
    /// dropped; a market left with fewer configs than its minimum provider
    /// count is dropped. Dropping a market can orphan another market's
    /// normalize-by reference, so pruning repeats until nothing changes.
    /// Only a remainder that still fails [`MarketMap::validate`] is an error.
    pub fn valid_subset(&self) -> Result<MarketMap, MarketMapError> {
        let mut repaired = self.clone();

        loop {
            let enabled: HashSet<String> = repaired
                .enabled_markets()
                .map(|m| m.ticker.currency_pair.to_string())
                .collect();
            let mut changed = false;

            for (key, market) in repaired.markets.iter_mut() {
                market.provider_configs.retain(|config| {
                    let Some(pair) = &config.normalize_by_pair else {
                        return true;
                    };
                    let resolvable = enabled.contains(&pair.to_string());
                    if !resolvable {
                        tracing::warn!(
                            market = %key,
                            provider = %config.name,
                            normalize_by = %pair,
                            "Pruning provider config with unresolvable normalize-by pair"
                        );
                        changed = true;
                    }
                    resolvable
                });
            }

            repaired.markets.retain(|key, market| {
                let have = market.provider_configs.len();
                let keep = have > 0 && have >= market.ticker.min_provider_count as usize;
                if !keep {
                    tracing::warn!(
                        market = %key,
                        providers = have,
                        min_providers = market.ticker.min_provider_count,
                        "Pruning market without enough resolvable providers"
                    );
                    changed = true;
                }
                keep
            });

            if !changed {
                break;
            }
        }

        repaired.validate()?;
        Ok(repaired)
    }

    pub fn from_json(json: &str) -> Result<Self, MarketMapError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_pretty_json(&self) -> Result<String, MarketMapError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a JSON market map from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MarketMapError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
