//! Provider-side tickers and resolved observations

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A data source's own spelling of a pair plus opaque metadata.
///
/// Two tickers are the same subscription only if both the off-chain
/// spelling and the metadata match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderTicker {
    pub off_chain_ticker: String,
    #[serde(default)]
    pub json: String,
}

impl ProviderTicker {
    pub fn new(off_chain_ticker: impl Into<String>, json: impl Into<String>) -> Self {
        Self {
            off_chain_ticker: off_chain_ticker.into(),
            json: json.into(),
        }
    }
}

impl fmt::Display for ProviderTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.off_chain_ticker)
    }
}

/// One timestamped observation produced by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    /// Observed price
    pub value: Decimal,
    /// When the source produced (or we received) the observation
    pub timestamp: DateTime<Utc>,
    /// Traded volume backing the observation, when the source reports one
    #[serde(default)]
    pub volume: Option<Decimal>,
}

impl ResolvedPrice {
    pub fn new(value: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            timestamp,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: Decimal) -> Self {
        self.volume = Some(volume);
        self
    }

    /// True if the observation is older than `max_age` relative to `now`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match now.checked_sub_signed(max_age) {
            Some(cutoff) => self.timestamp < cutoff,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_staleness_boundary() {
        let now = Utc::now();
        let max_age = chrono::Duration::seconds(10);

        let fresh = ResolvedPrice::new(dec!(1), now - chrono::Duration::seconds(10));
        assert!(!fresh.is_stale(now, max_age));

        let stale = ResolvedPrice::new(dec!(1), now - chrono::Duration::seconds(11));
        assert!(stale.is_stale(now, max_age));
    }

    #[test]
    fn test_provider_ticker_identity_includes_metadata() {
        let a = ProviderTicker::new("BTC-USD", "");
        let b = ProviderTicker::new("BTC-USD", r#"{"pool":"0xabc"}"#);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "BTC-USD");
    }
}
