//! Statistics over one pair's contributions

use super::AggregationError;
use crate::types::ResolvedPrice;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Weight of a contribution at the very start of the TVWAP window
const TVWAP_BASE_WEIGHT: Decimal = dec!(0.20);
/// Additional weight gained linearly up to `now`
const TVWAP_RECENCY_WEIGHT: Decimal = dec!(0.80);

/// Middle value; mean of the two middle values for an even count
pub fn median(values: &[Decimal]) -> Result<Decimal, AggregationError> {
    if values.is_empty() {
        return Err(AggregationError::NoContributions);
    }

    let mut sorted = values.to_vec();
    sorted.sort();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return Ok(sorted[mid]);
    }

    sorted[mid - 1]
        .checked_add(sorted[mid])
        .map(|sum| sum / Decimal::TWO)
        .ok_or(AggregationError::Overflow)
}

/// Σ(p·v) / Σv over contributions that carry a volume
pub fn vwap(prices: &[ResolvedPrice]) -> Result<Decimal, AggregationError> {
    weighted(prices.iter().filter_map(|p| Some((p.value, p.volume?))))
}

/// Time- and volume-weighted average over `[now - window, now]`.
///
/// Each weight is `volume · (0.20 + 0.80 · f)` where `f` is how far into the
/// window the observation lies (0 at the start, 1 at `now`). Observations
/// outside the window or without volume are ignored.
pub fn tvwap(
    prices: &[ResolvedPrice],
    now: DateTime<Utc>,
    window_ms: i64,
) -> Result<Decimal, AggregationError> {
    if window_ms <= 0 {
        return Err(AggregationError::ZeroAggregationPeriod);
    }
    let start = chrono::Duration::try_milliseconds(window_ms)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or(AggregationError::AggregationPeriodOutOfRange)?;
    let window = Decimal::from(window_ms);

    let mut samples = Vec::with_capacity(prices.len());
    for price in prices {
        let Some(volume) = price.volume else { continue };
        if price.timestamp < start {
            continue;
        }
        let offset = (price.timestamp.min(now) - start).num_milliseconds();
        let fraction = Decimal::from(offset) / window;
        let factor = TVWAP_BASE_WEIGHT + TVWAP_RECENCY_WEIGHT * fraction;
        let weight = volume.checked_mul(factor).ok_or(AggregationError::Overflow)?;
        samples.push((price.value, weight));
    }

    weighted(samples.into_iter())
}

fn weighted(samples: impl Iterator<Item = (Decimal, Decimal)>) -> Result<Decimal, AggregationError> {
    let mut numerator = Decimal::ZERO;
    let mut denominator = Decimal::ZERO;
    let mut seen = false;

    for (value, weight) in samples {
        seen = true;
        let product = value.checked_mul(weight).ok_or(AggregationError::Overflow)?;
        numerator = numerator
            .checked_add(product)
            .ok_or(AggregationError::Overflow)?;
        denominator = denominator
            .checked_add(weight)
            .ok_or(AggregationError::Overflow)?;
    }

    if !seen {
        return Err(AggregationError::NoContributions);
    }
    if denominator.is_zero() {
        return Err(AggregationError::ZeroVolume);
    }
    numerator
        .checked_div(denominator)
        .ok_or(AggregationError::Overflow)
}
