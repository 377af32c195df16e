//! Supervisor lifecycle and the aggregation tick

use super::OracleError;
use crate::aggregator::{PriceAggregator, PriceSnapshot};
use crate::config::OracleConfig;
use crate::marketmap::MarketMap;
use crate::orchestrator::{MarketMapSynchronizer, ProviderOrchestrator};
use crate::task::{Shutdown, ShutdownSignal, TaskSet};
use crate::telemetry::{
    increment_provider_counter, record_latency, set_gauge, CounterMetric, GaugeMetric,
    LatencyMetric,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};

/// Supervisor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

/// Runs providers, the market map synchronizer and the aggregation ticker
/// under one cancellation signal.
pub struct Oracle {
    config: OracleConfig,
    orchestrator: Arc<ProviderOrchestrator>,
    aggregator: Arc<PriceAggregator>,
    tasks: Arc<TaskSet>,
    synchronizer: Mutex<Option<MarketMapSynchronizer>>,
    state: watch::Sender<OracleState>,
    close: Shutdown,
}

impl Oracle {
    pub fn new(
        config: OracleConfig,
        orchestrator: Arc<ProviderOrchestrator>,
        aggregator: Arc<PriceAggregator>,
        tasks: Arc<TaskSet>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            aggregator,
            tasks,
            synchronizer: Mutex::new(None),
            state: watch::channel(OracleState::NotStarted).0,
            close: Shutdown::new(),
        }
    }

    /// Run `synchronizer` in the task set once started
    pub fn with_synchronizer(self, synchronizer: MarketMapSynchronizer) -> Self {
        Self {
            synchronizer: Mutex::new(Some(synchronizer)),
            ..self
        }
    }

    pub fn state(&self) -> OracleState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == OracleState::Running
    }

    pub fn orchestrator(&self) -> &Arc<ProviderOrchestrator> {
        &self.orchestrator
    }

    pub fn aggregator(&self) -> &Arc<PriceAggregator> {
        &self.aggregator
    }

    /// Last completed price snapshot
    pub async fn prices(&self) -> Arc<PriceSnapshot> {
        self.aggregator.get_prices().await
    }

    pub async fn market_map(&self) -> Arc<MarketMap> {
        self.orchestrator.market_map().await
    }

    /// Run until `parent` fires (`Err(Cancelled)`) or [`Oracle::stop`] is
    /// called (`Ok`). Every spawned task has finished when this returns.
    pub async fn start(&self, parent: ShutdownSignal) -> Result<(), OracleError> {
        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if *state == OracleState::NotStarted {
                *state = OracleState::Running;
                claimed = true;
            }
            claimed
        });
        if !claimed {
            return Err(OracleError::AlreadyStarted);
        }

        tracing::info!(
            update_interval_ms = self.config.update_interval_ms,
            aggregation = ?self.aggregator.method(),
            "Oracle starting"
        );
        let result = self.run(parent).await;

        self.state.send_replace(OracleState::Stopping);
        self.tasks.cancel();
        self.tasks.join_all().await;
        self.state.send_replace(OracleState::Stopped);

        match &result {
            Ok(()) => tracing::info!("Oracle stopped"),
            Err(e) => tracing::warn!(error = %e, "Oracle exited"),
        }
        result
    }

    async fn run(&self, mut parent: ShutdownSignal) -> Result<(), OracleError> {
        self.orchestrator.init().await?;
        self.orchestrator.start_providers().await?;

        if let Some(synchronizer) = self.synchronizer.lock().await.take() {
            let signal = self.tasks.signal();
            self.tasks
                .spawn("market_map_sync", synchronizer.run(signal))
                .await;
        }

        let mut close = self.close.subscribe();
        let mut ticker = interval(self.config.update_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = parent.recv() => {
                    tracing::info!("Parent cancelled, shutting down providers");
                    return Err(OracleError::Cancelled);
                }
                _ = close.recv() => return Ok(()),
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
    }

    /// Cancel every task, wait for them, then wait for `start` to return.
    ///
    /// Safe to call repeatedly, concurrently with `start`, or when `start`
    /// never ran.
    pub async fn stop(&self) {
        self.state.send_if_modified(|state| {
            if *state == OracleState::NotStarted {
                *state = OracleState::Stopped;
                return true;
            }
            false
        });

        self.tasks.cancel();
        self.tasks.join_all().await;
        self.close.trigger();

        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == OracleState::Stopped).await;
    }

    /// One collect-and-aggregate pass at `now`
    pub async fn tick(&self, now: DateTime<Utc>) -> Arc<PriceSnapshot> {
        let started = Instant::now();
        let max_age = chrono::Duration::milliseconds(
            i64::try_from(self.config.max_price_age_ms).unwrap_or(i64::MAX),
        );

        self.aggregator.reset().await;
        for provider in self.orchestrator.providers().await {
            let mut prices = provider.get_data().await;
            let before = prices.len();
            prices.retain(|_, price| !price.is_stale(now, max_age));

            let stale = before - prices.len();
            if stale > 0 {
                tracing::debug!(provider = provider.name(), stale, "Dropped stale prices");
                increment_provider_counter(CounterMetric::StalePrices, provider.name(), stale as u64);
            }
            self.aggregator
                .set_provider_prices(provider.name(), prices)
                .await;
        }

        let snapshot = self.aggregator.aggregate_prices(now).await;
        set_gauge(GaugeMetric::AggregatedPairs, snapshot.len() as f64);
        set_gauge(
            GaugeMetric::RunningProviders,
            self.orchestrator.running_providers().await as f64,
        );
        record_latency(LatencyMetric::AggregationTick, started.elapsed());
        snapshot
    }
}
