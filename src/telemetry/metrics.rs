//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One collect-and-aggregate pass
    AggregationTick,
    /// One market map fetch round trip
    MarketMapFetch,
    /// Applying a new market map to every provider
    MarketMapUpdate,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Providers with a live worker task
    RunningProviders,
    /// Pairs present in the latest snapshot
    AggregatedPairs,
    /// Markets in the held market map
    MarketMapMarkets,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Market maps applied
    MarketMapUpdates,
    /// Fetches that produced no usable map
    MarketMapFetchFailures,
    /// Candidate maps rejected by validation
    MarketMapRejected,
    /// Tasks that panicked
    TaskPanics,
    /// Observations dropped for staleness
    StalePrices,
    /// Per-provider request or decode failures
    ProviderErrors,
    /// Pairs whose statistic could not be computed
    AggregationErrors,
}

fn latency_name(metric: LatencyMetric) -> &'static str {
    match metric {
        LatencyMetric::AggregationTick => "oracle_aggregation_tick_latency_ms",
        LatencyMetric::MarketMapFetch => "oracle_market_map_fetch_latency_ms",
        LatencyMetric::MarketMapUpdate => "oracle_market_map_update_latency_ms",
    }
}

fn gauge_name(metric: GaugeMetric) -> &'static str {
    match metric {
        GaugeMetric::RunningProviders => "oracle_running_providers",
        GaugeMetric::AggregatedPairs => "oracle_aggregated_pairs",
        GaugeMetric::MarketMapMarkets => "oracle_market_map_markets",
    }
}

fn counter_name(metric: CounterMetric) -> &'static str {
    match metric {
        CounterMetric::MarketMapUpdates => "oracle_market_map_updates_total",
        CounterMetric::MarketMapFetchFailures => "oracle_market_map_fetch_failures_total",
        CounterMetric::MarketMapRejected => "oracle_market_map_rejected_total",
        CounterMetric::TaskPanics => "oracle_task_panics_total",
        CounterMetric::StalePrices => "oracle_stale_prices_total",
        CounterMetric::ProviderErrors => "oracle_provider_errors_total",
        CounterMetric::AggregationErrors => "oracle_aggregation_errors_total",
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    ::metrics::histogram!(latency_name(metric)).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    ::metrics::gauge!(gauge_name(metric)).set(value);
}

/// Increment a counter by `n`
pub fn increment_counter(metric: CounterMetric, n: u64) {
    ::metrics::counter!(counter_name(metric)).increment(n);
}

/// Increment a counter labelled with the provider it concerns
pub fn increment_provider_counter(metric: CounterMetric, provider: &str, n: u64) {
    ::metrics::counter!(counter_name(metric), "provider" => provider.to_string()).increment(n);
}
