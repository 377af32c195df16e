//! Wiring an oracle from configuration

use super::{Oracle, OracleError};
use crate::aggregator::PriceAggregator;
use crate::config::{Config, MarketMapConfig};
use crate::marketmap::{
    FailoverFetcher, FetchError, FileFetcher, HttpFetcher, HttpFetcherConfig, MarketMap,
    MarketMapFetcher, UnionFetcher,
};
use crate::orchestrator::{MarketMapSynchronizer, ProviderOrchestrator};
use crate::provider::{DefaultProviderFactory, ProviderFactory};
use crate::task::TaskSet;
use std::sync::Arc;

/// One fetcher for a source URL; `file://` reads a local file
fn fetcher_for(url: &str, config: &MarketMapConfig) -> Result<Arc<dyn MarketMapFetcher>, FetchError> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Arc::new(FileFetcher::new(path)));
    }
    let http = HttpFetcherConfig::new(url).timeout(config.fetch_timeout());
    Ok(Arc::new(HttpFetcher::new(http)?))
}

/// The configured market map fetcher, if any.
///
/// A fallback URL wraps the primary in a [`FailoverFetcher`]; a merge URL
/// then unions that with one more source through a [`UnionFetcher`].
pub fn build_fetcher(
    config: &MarketMapConfig,
) -> Result<Option<Arc<dyn MarketMapFetcher>>, FetchError> {
    let Some(url) = &config.fetch_url else {
        return Ok(None);
    };
    let primary = fetcher_for(url, config)?;

    let fetcher = match &config.fallback_url {
        Some(fallback) => {
            let secondary = fetcher_for(fallback, config)?;
            Arc::new(FailoverFetcher::with_threshold(
                primary,
                secondary,
                config.failover_threshold,
            )) as Arc<dyn MarketMapFetcher>
        }
        None => primary,
    };

    let fetcher = match &config.merge_url {
        Some(merge) => {
            let extra = fetcher_for(merge, config)?;
            Arc::new(UnionFetcher::new(fetcher, extra)) as Arc<dyn MarketMapFetcher>
        }
        None => fetcher,
    };
    Ok(Some(fetcher))
}

impl Oracle {
    /// Build with the built-in provider factory
    pub fn from_config(config: &Config) -> Result<Self, OracleError> {
        Self::with_factory(config, Arc::new(DefaultProviderFactory))
    }

    /// Build every component from `config`.
    ///
    /// An unreadable or invalid initial market map is fatal; without one the
    /// oracle starts empty and waits for the synchronizer.
    pub fn with_factory(
        config: &Config,
        factory: Arc<dyn ProviderFactory>,
    ) -> Result<Self, OracleError> {
        let market_map = match &config.market_map.initial_path {
            Some(path) => {
                let market_map = MarketMap::load(path)?;
                tracing::info!(path = %path.display(), markets = market_map.len(), "Loaded initial market map");
                market_map
            }
            None => MarketMap::new(),
        };

        let tasks = Arc::new(TaskSet::new());
        let aggregator = Arc::new(PriceAggregator::from_config(&config.oracle));
        let orchestrator = Arc::new(ProviderOrchestrator::new(
            config.providers.clone(),
            factory,
            aggregator.clone(),
            tasks.clone(),
            market_map,
        ));

        let oracle = Oracle::new(config.oracle.clone(), orchestrator.clone(), aggregator, tasks);

        let Some(fetcher) = build_fetcher(&config.market_map)? else {
            return Ok(oracle);
        };
        let mut synchronizer = MarketMapSynchronizer::new(
            fetcher,
            orchestrator,
            config.market_map.chain_id.clone(),
            config.market_map.update_interval(),
        );
        if let Some(path) = &config.market_map.persist_path {
            synchronizer = synchronizer.persist_to(path);
        }
        Ok(oracle.with_synchronizer(synchronizer))
    }
}
