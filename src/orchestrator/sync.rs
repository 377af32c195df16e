//! Market map synchronization loop

use super::{OrchestratorError, ProviderOrchestrator};
use crate::marketmap::{ChainId, MarketMap, MarketMapFetcher};
use crate::task::ShutdownSignal;
use crate::telemetry::{increment_counter, record_latency, CounterMetric, LatencyMetric};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

/// What one synchronization pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing resolved for the tracked chain id
    FetchFailed,
    /// Candidate was structurally invalid even after repair
    Rejected,
    /// Candidate equals the held map
    Unchanged,
    /// Candidate applied
    Updated,
    /// Orchestrator refused the candidate; previous map kept
    UpdateFailed,
}

/// Polls a fetcher and pushes changed market maps to the orchestrator
pub struct MarketMapSynchronizer {
    fetcher: Arc<dyn MarketMapFetcher>,
    orchestrator: Arc<ProviderOrchestrator>,
    chain_id: ChainId,
    interval: Duration,
    persist_path: Option<PathBuf>,
}

impl MarketMapSynchronizer {
    pub fn new(
        fetcher: Arc<dyn MarketMapFetcher>,
        orchestrator: Arc<ProviderOrchestrator>,
        chain_id: impl Into<ChainId>,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            orchestrator,
            chain_id: chain_id.into(),
            interval,
            persist_path: None,
        }
    }

    /// Write every applied map to `path` as pretty JSON
    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// Run passes on a fixed interval until `shutdown` fires
    pub async fn run(self, mut shutdown: ShutdownSignal) -> Result<(), OrchestratorError> {
        tracing::info!(
            fetcher = self.fetcher.name(),
            chain_id = %self.chain_id,
            interval_ms = self.interval.as_millis() as u64,
            "Market map sync started"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Market map sync stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.sync_once().await;
                }
            }
        }
    }

    /// Fetch, repair, compare and apply once
    pub async fn sync_once(&self) -> SyncOutcome {
        let started = Instant::now();
        let response = self.fetcher.fetch(std::slice::from_ref(&self.chain_id)).await;
        record_latency(LatencyMetric::MarketMapFetch, started.elapsed());

        let Some((candidate, fetched_at)) = response.resolved(&self.chain_id) else {
            match response.error(&self.chain_id) {
                Some(e) => tracing::warn!(chain_id = %self.chain_id, error = %e, "Market map fetch failed"),
                None => tracing::warn!(chain_id = %self.chain_id, "Market map fetch returned nothing for chain id"),
            }
            increment_counter(CounterMetric::MarketMapFetchFailures, 1);
            return SyncOutcome::FetchFailed;
        };

        let candidate = match candidate.valid_subset() {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(error = %e, "Fetched market map rejected");
                increment_counter(CounterMetric::MarketMapRejected, 1);
                return SyncOutcome::Rejected;
            }
        };

        if *self.orchestrator.market_map().await == candidate {
            tracing::debug!(%fetched_at, "Market map unchanged");
            self.orchestrator.record_sync(Utc::now()).await;
            return SyncOutcome::Unchanged;
        }

        let persisted = self.persist_path.as_ref().map(|path| (path, candidate.clone()));
        if let Err(e) = self.orchestrator.update_market_map(candidate).await {
            tracing::error!(error = %e, "Failed to apply market map");
            return SyncOutcome::UpdateFailed;
        }

        if let Some((path, market_map)) = persisted {
            persist(path, &market_map).await;
        }
        SyncOutcome::Updated
    }
}

/// Best-effort write; failures are logged and otherwise ignored
async fn persist(path: &Path, market_map: &MarketMap) {
    let json = match market_map.to_pretty_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode market map for persistence");
            return;
        }
    };

    match tokio::fs::write(path, json).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Market map persisted"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to persist market map"),
    }
}
