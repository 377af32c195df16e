//! Aggregation output and errors

use crate::types::CurrencyPair;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

/// Per-pair aggregation failures; the pair is omitted, never the tick
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("no contributions")]
    NoContributions,
    #[error("contributions carry zero total volume")]
    ZeroVolume,
    #[error("aggregation period is zero")]
    ZeroAggregationPeriod,
    #[error("aggregation period reaches outside the representable time range")]
    AggregationPeriodOutOfRange,
    #[error("decimal overflow")]
    Overflow,
}

/// One generation of aggregated prices.
///
/// Rebuilt wholly every tick and published behind an `Arc`, so a reader
/// holds either the complete previous generation or the complete new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSnapshot {
    pub prices: BTreeMap<CurrencyPair, Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl PriceSnapshot {
    pub fn get(&self, pair: &CurrencyPair) -> Option<Decimal> {
        self.prices.get(pair).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
