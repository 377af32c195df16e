//! Currency pair identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when building or parsing a currency pair
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PairError {
    /// String form was not `BASE/QUOTE`
    #[error("invalid currency pair format: {0:?}")]
    InvalidFormat(String),
    /// Base or quote denomination is empty
    #[error("currency pair has an empty denomination: {0:?}")]
    EmptyDenom(String),
}

/// Canonical (base, quote) identity for a reported price.
///
/// Denominations are stored upper-cased so that `btc/usd` and `BTC/USD`
/// name the same pair. Ordered by base, then quote, so snapshots keyed
/// by pair iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    /// Create a pair from its base and quote denominations
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Check that both denominations are present
    pub fn validate(&self) -> Result<(), PairError> {
        if self.base.trim().is_empty() || self.quote.trim().is_empty() {
            return Err(PairError::EmptyDenom(self.to_string()));
        }
        Ok(())
    }

    /// The pair with base and quote swapped
    pub fn inverted(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = PairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => {
                let pair = Self::new(base.trim(), quote.trim());
                pair.validate()?;
                Ok(pair)
            }
            _ => Err(PairError::InvalidFormat(s.to_string())),
        }
    }
}
