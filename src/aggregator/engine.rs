//! Per-tick price aggregation over the market map

use super::math::{median, tvwap, vwap};
use super::{AggregationError, PriceSnapshot};
use crate::config::{AggregationMethod, OracleConfig};
use crate::marketmap::{Market, MarketMap};
use crate::telemetry::{increment_counter, CounterMetric};
use crate::types::{CurrencyPair, ProviderTicker, ResolvedPrice};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

type ProviderPrices = HashMap<ProviderTicker, ResolvedPrice>;

#[derive(Default)]
struct AggregatorState {
    market_map: Arc<MarketMap>,
    provider_prices: HashMap<String, ProviderPrices>,
}

/// Combines provider observations into one price per enabled pair.
///
/// Contributions and the market map sit behind one lock; the published
/// snapshot sits behind another, so readers never wait on a running
/// aggregation.
pub struct PriceAggregator {
    method: AggregationMethod,
    tvwap_window_ms: i64,
    state: RwLock<AggregatorState>,
    snapshot: RwLock<Arc<PriceSnapshot>>,
}

impl PriceAggregator {
    pub fn new(method: AggregationMethod, tvwap_window: Duration) -> Self {
        Self {
            method,
            tvwap_window_ms: i64::try_from(tvwap_window.as_millis()).unwrap_or(i64::MAX),
            state: RwLock::new(AggregatorState::default()),
            snapshot: RwLock::new(Arc::new(PriceSnapshot::default())),
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(config.aggregation, config.tvwap_window())
    }

    pub fn method(&self) -> AggregationMethod {
        self.method
    }

    /// Replace everything `provider` contributed with `prices`
    pub async fn set_provider_prices(&self, provider: &str, prices: ProviderPrices) {
        let mut state = self.state.write().await;
        state.provider_prices.insert(provider.to_string(), prices);
    }

    /// Drop all contributions
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.provider_prices.clear();
    }

    /// Install the map used to resolve contributions on the next pass
    pub async fn update_market_map(&self, market_map: Arc<MarketMap>) {
        let mut state = self.state.write().await;
        state.market_map = market_map;
    }

    pub async fn market_map(&self) -> Arc<MarketMap> {
        self.state.read().await.market_map.clone()
    }

    /// Compute and publish a new snapshot from the current contributions
    pub async fn aggregate_prices(&self, now: DateTime<Utc>) -> Arc<PriceSnapshot> {
        let prices = {
            let state = self.state.read().await;
            self.compute(&state, now)
        };

        let snapshot = Arc::new(PriceSnapshot {
            prices,
            timestamp: now,
        });
        *self.snapshot.write().await = snapshot.clone();
        snapshot
    }

    /// Last completed snapshot
    pub async fn get_prices(&self) -> Arc<PriceSnapshot> {
        self.snapshot.read().await.clone()
    }

    fn compute(&self, state: &AggregatorState, now: DateTime<Utc>) -> BTreeMap<CurrencyPair, Decimal> {
        let markets: Vec<&Market> = state.market_map.enabled_markets().collect();

        // Pass 1: direct contributions only; these prices back normalize-by
        let mut direct = BTreeMap::new();
        for market in &markets {
            let contributions = Self::contributions(market, state, None);
            if let Some(price) = self.statistic(market, &contributions, now) {
                direct.insert(market.ticker.currency_pair.clone(), price);
            }
        }

        // Pass 2: every contribution, normalized ones converted through pass 1
        let mut prices = BTreeMap::new();
        for market in &markets {
            let contributions = Self::contributions(market, state, Some(&direct));
            if let Some(price) = self.statistic(market, &contributions, now) {
                prices.insert(market.ticker.currency_pair.clone(), price);
            }
        }
        prices
    }

    /// Resolve a market's provider configs to converted observations.
    ///
    /// Without `normalizers` only configs lacking a normalize-by pair
    /// contribute; with them, normalized configs are scaled by the
    /// normalize-by pair's price or skipped when it has none.
    fn contributions(
        market: &Market,
        state: &AggregatorState,
        normalizers: Option<&BTreeMap<CurrencyPair, Decimal>>,
    ) -> Vec<ResolvedPrice> {
        let mut out = Vec::with_capacity(market.provider_configs.len());

        for config in &market.provider_configs {
            let Some(observed) = state
                .provider_prices
                .get(&config.name)
                .and_then(|prices| prices.get(&config.provider_ticker()))
            else {
                continue;
            };

            let mut price = observed.clone();
            if config.invert {
                if price.value.is_zero() {
                    continue;
                }
                price.value = Decimal::ONE / price.value;
            }

            match (&config.normalize_by_pair, normalizers) {
                (None, _) => out.push(price),
                (Some(_), None) => {}
                (Some(pair), Some(normalizers)) => {
                    let Some(scaled) = normalizers
                        .get(pair)
                        .and_then(|factor| price.value.checked_mul(*factor))
                    else {
                        continue;
                    };
                    price.value = scaled;
                    out.push(price);
                }
            }
        }
        out
    }

    fn statistic(
        &self,
        market: &Market,
        contributions: &[ResolvedPrice],
        now: DateTime<Utc>,
    ) -> Option<Decimal> {
        let pair = &market.ticker.currency_pair;
        if contributions.is_empty()
            || contributions.len() < market.ticker.min_provider_count as usize
        {
            return None;
        }

        let result = match self.method {
            AggregationMethod::Median => {
                let values: Vec<Decimal> = contributions.iter().map(|p| p.value).collect();
                median(&values)
            }
            AggregationMethod::Vwap => vwap(contributions),
            AggregationMethod::Tvwap => tvwap(contributions, now, self.tvwap_window_ms),
        };

        match result {
            Ok(price) => Some(price),
            Err(e) => {
                log_error(pair, &e);
                None
            }
        }
    }
}

fn log_error(pair: &CurrencyPair, error: &AggregationError) {
    tracing::debug!(pair = %pair, error = %error, "Pair not aggregated");
    increment_counter(CounterMetric::AggregationErrors, 1);
}
