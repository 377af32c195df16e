//! Provider registry and run-state reconciliation

use super::OrchestratorError;
use crate::aggregator::PriceAggregator;
use crate::config::ProviderEndpointConfig;
use crate::marketmap::MarketMap;
use crate::provider::{Provider, ProviderFactory};
use crate::task::TaskSet;
use crate::telemetry::{
    increment_counter, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric,
};
use crate::types::ProviderTicker;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// A live worker paired with the endpoint config it was built from.
///
/// Created once at init per configured source and never destroyed; a
/// provider with zero subscriptions is simply not running.
#[derive(Clone)]
pub struct ProviderState {
    pub provider: Arc<dyn Provider>,
    pub config: ProviderEndpointConfig,
}

impl ProviderState {
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

struct Inner {
    initialized: bool,
    providers: BTreeMap<String, ProviderState>,
    market_map: Arc<MarketMap>,
    last_sync: Option<DateTime<Utc>>,
}

/// Owns the provider registry and the held market map.
///
/// The registry lock is only held to copy state in or out; provider
/// reconfiguration runs outside it. Market-map updates are serialized by a
/// separate lock so two updates never interleave their provider changes.
pub struct ProviderOrchestrator {
    configs: Vec<ProviderEndpointConfig>,
    factory: Arc<dyn ProviderFactory>,
    aggregator: Arc<PriceAggregator>,
    tasks: Arc<TaskSet>,
    inner: Mutex<Inner>,
    update_lock: Mutex<()>,
}

impl ProviderOrchestrator {
    pub fn new(
        configs: Vec<ProviderEndpointConfig>,
        factory: Arc<dyn ProviderFactory>,
        aggregator: Arc<PriceAggregator>,
        tasks: Arc<TaskSet>,
        market_map: MarketMap,
    ) -> Self {
        Self {
            configs,
            factory,
            aggregator,
            tasks,
            inner: Mutex::new(Inner {
                initialized: false,
                providers: BTreeMap::new(),
                market_map: Arc::new(market_map),
                last_sync: None,
            }),
            update_lock: Mutex::new(()),
        }
    }

    /// Build one worker per configured source, seeded from the held map.
    ///
    /// The held map is repaired first and handed to the aggregator. A source
    /// the factory does not know is fatal.
    pub async fn init(&self) -> Result<(), OrchestratorError> {
        let _serial = self.update_lock.lock().await;

        let current = {
            let inner = self.inner.lock().await;
            if inner.initialized {
                return Err(OrchestratorError::AlreadyInitialized);
            }
            inner.market_map.clone()
        };

        let market_map = Arc::new(current.valid_subset()?);

        let mut providers = BTreeMap::new();
        for config in &self.configs {
            let ids = market_map.provider_tickers(&config.name);
            let provider = self
                .factory
                .create(config, ids)
                .map_err(|e| OrchestratorError::provider(&config.name, e))?;

            tracing::info!(
                provider = %config.name,
                tickers = provider.get_ids().len(),
                "Provider registered"
            );
            providers.insert(
                config.name.clone(),
                ProviderState {
                    provider,
                    config: config.clone(),
                },
            );
        }

        for name in market_map.provider_names() {
            if !providers.contains_key(&name) {
                tracing::warn!(provider = %name, "Market map references an unconfigured provider");
            }
        }

        {
            let mut inner = self.inner.lock().await;
            inner.providers = providers;
            inner.market_map = market_map.clone();
            inner.initialized = true;
        }
        self.aggregator.update_market_map(market_map.clone()).await;
        set_gauge(GaugeMetric::MarketMapMarkets, market_map.len() as f64);
        Ok(())
    }

    /// Start every provider that has something to serve
    pub async fn start_providers(&self) -> Result<(), OrchestratorError> {
        for state in self.states().await {
            let ids = state.provider.get_ids();
            self.update_provider_state(ids, &state).await?;
        }
        Ok(())
    }

    /// Swap a provider's subscription set and reconcile its run state.
    ///
    /// | ids       | running | action                          |
    /// |-----------|---------|---------------------------------|
    /// | empty     | yes     | worker sees the empty set, exits |
    /// | non-empty | no      | spawn into the task set         |
    /// | non-empty | yes     | swap only, no restart           |
    /// | empty     | no      | nothing                         |
    pub async fn update_provider_state(
        &self,
        ids: Vec<ProviderTicker>,
        state: &ProviderState,
    ) -> Result<(), OrchestratorError> {
        let provider = &state.provider;
        let name = state.name();
        let count = ids.len();

        provider
            .update(ids)
            .await
            .map_err(|e| OrchestratorError::provider(name, e))?;

        match (count == 0, provider.is_running()) {
            (true, true) => {
                tracing::info!(provider = %name, "No subscriptions left, provider stopping");
            }
            (false, false) => {
                let worker = provider.clone();
                let signal = self.tasks.signal();
                let spawned = self
                    .tasks
                    .spawn(name, async move { worker.start(signal).await })
                    .await;
                if spawned {
                    tracing::info!(provider = %name, tickers = count, "Provider spawned");
                }
            }
            (false, true) => {
                tracing::debug!(provider = %name, tickers = count, "Provider subscriptions updated");
            }
            (true, false) => {}
        }
        Ok(())
    }

    /// Repair `market_map`, reconfigure every provider, then swap it in.
    ///
    /// The held map and the aggregator only change once every provider has
    /// accepted its new set. On a provider failure the providers already
    /// reconfigured are put back on their previous sets and the previous
    /// map is kept.
    pub async fn update_market_map(&self, market_map: MarketMap) -> Result<(), OrchestratorError> {
        let _serial = self.update_lock.lock().await;
        let started = Instant::now();

        let market_map = Arc::new(market_map.valid_subset()?);
        let states = self.states().await;

        let mut applied: Vec<(&ProviderState, Vec<ProviderTicker>)> = Vec::new();
        for state in &states {
            let previous = state.provider.get_ids();
            let ids = market_map.provider_tickers(state.name());

            if let Err(e) = self.update_provider_state(ids, state).await {
                tracing::error!(provider = %state.name(), error = %e, "Provider reconfiguration failed, keeping previous market map");
                for (state, previous) in applied {
                    if let Err(e) = self.update_provider_state(previous, state).await {
                        tracing::error!(provider = %state.name(), error = %e, "Provider rollback failed");
                    }
                }
                return Err(e);
            }
            applied.push((state, previous));
        }

        {
            let mut inner = self.inner.lock().await;
            inner.market_map = market_map.clone();
            inner.last_sync = Some(Utc::now());
        }
        self.aggregator.update_market_map(market_map.clone()).await;

        increment_counter(CounterMetric::MarketMapUpdates, 1);
        set_gauge(GaugeMetric::MarketMapMarkets, market_map.len() as f64);
        record_latency(LatencyMetric::MarketMapUpdate, started.elapsed());
        tracing::info!(markets = market_map.len(), "Market map updated");
        Ok(())
    }

    /// Currently held market map
    pub async fn market_map(&self) -> Arc<MarketMap> {
        self.inner.lock().await.market_map.clone()
    }

    pub async fn providers(&self) -> Vec<Arc<dyn Provider>> {
        let inner = self.inner.lock().await;
        inner.providers.values().map(|s| s.provider.clone()).collect()
    }

    pub async fn provider_state(&self, name: &str) -> Option<ProviderState> {
        self.inner.lock().await.providers.get(name).cloned()
    }

    /// When the market map was last confirmed current
    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().await.last_sync
    }

    pub async fn record_sync(&self, at: DateTime<Utc>) {
        self.inner.lock().await.last_sync = Some(at);
    }

    async fn states(&self) -> Vec<ProviderState> {
        let inner = self.inner.lock().await;
        inner.providers.values().cloned().collect()
    }

    /// Providers whose worker task is live right now
    pub async fn running_providers(&self) -> usize {
        self.providers()
            .await
            .iter()
            .filter(|p| p.is_running())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregationMethod;
    use crate::marketmap::{Market, ProviderConfig, Ticker};
    use crate::provider::{PriceStore, ProviderError, ProviderKind};
    use crate::task::ShutdownSignal;
    use crate::types::{CurrencyPair, ResolvedPrice};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::watch;

    /// Runs until shutdown or an empty set; counts how often it was started
    struct MockProvider {
        name: String,
        ids: watch::Sender<Vec<ProviderTicker>>,
        running: AtomicBool,
        starts: AtomicUsize,
        max: usize,
        store: PriceStore,
    }

    impl MockProvider {
        fn new(name: &str, ids: Vec<ProviderTicker>, max: usize) -> Self {
            Self {
                name: name.to_string(),
                ids: watch::channel(ids).0,
                running: AtomicBool::new(false),
                starts: AtomicUsize::new(0),
                max,
                store: PriceStore::new(),
            }
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Api
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        async fn start(&self, mut shutdown: ShutdownSignal) -> Result<(), ProviderError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.running.store(true, Ordering::SeqCst);
            let mut ids = self.ids.subscribe();
            loop {
                if ids.borrow_and_update().is_empty() {
                    break;
                }
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ids.changed() => {}
                }
            }
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn get_ids(&self) -> Vec<ProviderTicker> {
            self.ids.borrow().clone()
        }

        async fn update(&self, ids: Vec<ProviderTicker>) -> Result<(), ProviderError> {
            if ids.len() > self.max {
                return Err(ProviderError::TooManySubscriptions {
                    provider: self.name.clone(),
                    requested: ids.len(),
                    max: self.max,
                });
            }
            self.ids.send_replace(ids);
            Ok(())
        }

        async fn get_data(&self) -> HashMap<ProviderTicker, ResolvedPrice> {
            self.store.snapshot().await
        }
    }

    /// Hands out mocks and remembers them for inspection
    #[derive(Default)]
    struct MockFactory {
        created: std::sync::Mutex<HashMap<String, Arc<MockProvider>>>,
        max: HashMap<String, usize>,
    }

    impl MockFactory {
        fn get(&self, name: &str) -> Arc<MockProvider> {
            self.created.lock().unwrap()[name].clone()
        }
    }

    impl ProviderFactory for MockFactory {
        fn create(
            &self,
            config: &ProviderEndpointConfig,
            ids: Vec<ProviderTicker>,
        ) -> Result<Arc<dyn Provider>, ProviderError> {
            if config.name == "unknown" {
                return Err(ProviderError::UnknownProvider(config.name.clone()));
            }
            let max = self.max.get(&config.name).copied().unwrap_or(usize::MAX);
            let provider = Arc::new(MockProvider::new(&config.name, ids, max));
            self.created
                .lock()
                .unwrap()
                .insert(config.name.clone(), provider.clone());
            Ok(provider)
        }
    }

    fn btc_map(providers: &[&str]) -> MarketMap {
        MarketMap::from_markets([Market::new(
            Ticker::new(CurrencyPair::new("BTC", "USD"), 8, 1),
            providers
                .iter()
                .map(|p| ProviderConfig::new(*p, "BTC-USD"))
                .collect(),
        )])
    }

    fn two_market_map() -> MarketMap {
        let mut map = btc_map(&["a"]);
        map.markets.extend(
            MarketMap::from_markets([Market::new(
                Ticker::new(CurrencyPair::new("ETH", "USD"), 8, 1),
                vec![ProviderConfig::new("a", "ETH-USD")],
            )])
            .markets,
        );
        map
    }

    fn setup(
        names: &[&str],
        factory: MockFactory,
        map: MarketMap,
    ) -> (ProviderOrchestrator, Arc<MockFactory>, Arc<TaskSet>, Arc<PriceAggregator>) {
        let factory = Arc::new(factory);
        let tasks = Arc::new(TaskSet::new());
        let aggregator = Arc::new(PriceAggregator::new(
            AggregationMethod::Median,
            Duration::from_secs(60),
        ));
        let configs = names
            .iter()
            .map(|n| ProviderEndpointConfig::new(*n, ProviderKind::Api))
            .collect();
        let orchestrator =
            ProviderOrchestrator::new(configs, factory.clone(), aggregator.clone(), tasks.clone(), map);
        (orchestrator, factory, tasks, aggregator)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_init_seeds_providers_from_map() {
        let (orch, factory, _tasks, aggregator) =
            setup(&["a", "b"], MockFactory::default(), btc_map(&["a"]));
        orch.init().await.unwrap();

        assert_eq!(orch.providers().await.len(), 2);
        assert_eq!(factory.get("a").get_ids().len(), 1);
        assert!(factory.get("b").get_ids().is_empty());
        assert_eq!(aggregator.market_map().await.len(), 1);
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let (orch, _, _, _) = setup(&["a"], MockFactory::default(), MarketMap::new());
        orch.init().await.unwrap();
        assert!(matches!(
            orch.init().await,
            Err(OrchestratorError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_fatal() {
        let (orch, _, _, _) = setup(&["a", "unknown"], MockFactory::default(), MarketMap::new());
        assert!(matches!(
            orch.init().await,
            Err(OrchestratorError::UnknownProvider(name)) if name == "unknown"
        ));
    }

    #[tokio::test]
    async fn test_zero_subscriptions_never_started() {
        let (orch, factory, tasks, _) = setup(&["a", "b"], MockFactory::default(), btc_map(&["a"]));
        orch.init().await.unwrap();
        orch.start_providers().await.unwrap();
        settle().await;

        assert!(factory.get("a").is_running());
        assert!(!factory.get("b").is_running());
        assert_eq!(factory.get("b").starts.load(Ordering::SeqCst), 0);

        tasks.cancel();
        tasks.join_all().await;
    }

    #[tokio::test]
    async fn test_running_update_does_not_restart() {
        let (orch, factory, tasks, _) = setup(&["a"], MockFactory::default(), btc_map(&["a"]));
        orch.init().await.unwrap();
        orch.start_providers().await.unwrap();
        settle().await;

        orch.update_market_map(two_market_map()).await.unwrap();
        settle().await;

        let a = factory.get("a");
        assert!(a.is_running());
        assert_eq!(a.get_ids().len(), 2);
        assert_eq!(a.starts.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.active_count().await, 1);
        assert_eq!(orch.running_providers().await, 1);

        tasks.cancel();
        tasks.join_all().await;
        assert_eq!(orch.running_providers().await, 0);
    }

    #[tokio::test]
    async fn test_idempotent_update() {
        let (orch, factory, tasks, _) = setup(&["a"], MockFactory::default(), btc_map(&["a"]));
        orch.init().await.unwrap();
        orch.start_providers().await.unwrap();
        settle().await;

        orch.update_market_map(two_market_map()).await.unwrap();
        let first = orch.market_map().await;
        orch.update_market_map(two_market_map()).await.unwrap();
        settle().await;

        assert_eq!(*orch.market_map().await, *first);
        assert_eq!(factory.get("a").starts.load(Ordering::SeqCst), 1);

        tasks.cancel();
        tasks.join_all().await;
    }

    #[tokio::test]
    async fn test_empty_subscriptions_stop_then_restart() {
        let (orch, factory, tasks, _) = setup(&["a", "b"], MockFactory::default(), btc_map(&["a"]));
        orch.init().await.unwrap();
        orch.start_providers().await.unwrap();
        settle().await;

        orch.update_market_map(btc_map(&["b"])).await.unwrap();
        settle().await;
        assert!(!factory.get("a").is_running());
        assert!(factory.get("b").is_running());

        orch.update_market_map(btc_map(&["a"])).await.unwrap();
        settle().await;
        assert!(factory.get("a").is_running());
        assert_eq!(factory.get("a").starts.load(Ordering::SeqCst), 2);

        tasks.cancel();
        tasks.join_all().await;
    }

    #[tokio::test]
    async fn test_failed_update_keeps_previous_map() {
        let factory = MockFactory {
            max: HashMap::from([("b".to_string(), 1)]),
            ..Default::default()
        };
        let (orch, factory, tasks, aggregator) = setup(&["a", "b"], factory, btc_map(&["a", "b"]));
        orch.init().await.unwrap();
        orch.start_providers().await.unwrap();

        let mut too_big = two_market_map();
        for market in too_big.markets.values_mut() {
            let ticker = market.provider_configs[0].off_chain_ticker.clone();
            market.provider_configs.push(ProviderConfig::new("b", ticker));
        }

        let before = orch.market_map().await;
        let result = orch.update_market_map(too_big).await;
        assert!(matches!(result, Err(OrchestratorError::Provider { ref provider, .. }) if provider == "b"));
        assert_eq!(*orch.market_map().await, *before);
        assert_eq!(*aggregator.market_map().await, *before);
        // "a" was put back on its previous set
        assert_eq!(factory.get("a").get_ids(), before.provider_tickers("a"));

        tasks.cancel();
        tasks.join_all().await;
    }

    #[tokio::test]
    async fn test_invalid_map_rejected() {
        let (orch, _, _, _) = setup(&["a"], MockFactory::default(), btc_map(&["a"]));
        orch.init().await.unwrap();

        let mut bad = btc_map(&["a"]);
        bad.markets.get_mut("BTC/USD").unwrap().ticker.decimals = 99;
        let result = orch.update_market_map(bad).await;
        assert!(matches!(result, Err(OrchestratorError::MarketMap(_))));
        assert_eq!(*orch.market_map().await, btc_map(&["a"]));
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_maps() {
        let (orch, _, tasks, _) = setup(&["a"], MockFactory::default(), btc_map(&["a"]));
        let orch = Arc::new(orch);
        orch.init().await.unwrap();

        let one = btc_map(&["a"]);
        let two = two_market_map();

        let reader = {
            let orch = orch.clone();
            let (one, two) = (one.clone(), two.clone());
            tokio::spawn(async move {
                for _ in 0..200 {
                    let map = orch.market_map().await;
                    assert!(*map == one || *map == two);
                    tokio::task::yield_now().await;
                }
            })
        };

        for i in 0..50 {
            let map = if i % 2 == 0 { two.clone() } else { one.clone() };
            orch.update_market_map(map).await.unwrap();
        }
        reader.await.unwrap();

        tasks.cancel();
        tasks.join_all().await;
    }
}
