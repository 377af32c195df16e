//! Shared fixtures: scripted providers and market maps

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oracle_sidecar::config::ProviderEndpointConfig;
use oracle_sidecar::marketmap::{Market, MarketMap, ProviderConfig, Ticker};
use oracle_sidecar::provider::{Provider, ProviderError, ProviderFactory, ProviderKind};
use oracle_sidecar::task::ShutdownSignal;
use oracle_sidecar::types::{CurrencyPair, ProviderTicker, ResolvedPrice};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Publishes `price` for every subscribed ticker once per start, stamped at
/// that moment, then idles until shutdown or an empty set.
pub struct ScriptedProvider {
    name: String,
    price: Decimal,
    ids: watch::Sender<Vec<ProviderTicker>>,
    data: Mutex<HashMap<ProviderTicker, ResolvedPrice>>,
    running: AtomicBool,
    pub starts: AtomicUsize,
}

impl ScriptedProvider {
    fn publish(&self, at: DateTime<Utc>) {
        let ids = self.ids.borrow().clone();
        let mut data = self.data.lock().unwrap();
        data.clear();
        for id in ids {
            data.insert(id, ResolvedPrice::new(self.price, at));
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
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
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ProviderError::AlreadyRunning(self.name.clone()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.publish(Utc::now());

        let mut ids = self.ids.subscribe();
        loop {
            if ids.borrow_and_update().is_empty() {
                break;
            }
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ids.changed() => self.publish(Utc::now()),
            }
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn get_ids(&self) -> Vec<ProviderTicker> {
        self.ids.borrow().clone()
    }

    async fn update(&self, ids: Vec<ProviderTicker>) -> Result<(), ProviderError> {
        self.data.lock().unwrap().retain(|id, _| ids.contains(id));
        self.ids.send_replace(ids);
        Ok(())
    }

    async fn get_data(&self) -> HashMap<ProviderTicker, ResolvedPrice> {
        self.data.lock().unwrap().clone()
    }
}

/// Builds [`ScriptedProvider`]s with a fixed price per provider name
#[derive(Default)]
pub struct ScriptedFactory {
    prices: HashMap<String, Decimal>,
    created: Mutex<HashMap<String, Arc<ScriptedProvider>>>,
}

impl ScriptedFactory {
    pub fn new(prices: &[(&str, Decimal)]) -> Self {
        Self {
            prices: prices.iter().map(|(n, p)| (n.to_string(), *p)).collect(),
            created: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider(&self, name: &str) -> Arc<ScriptedProvider> {
        self.created.lock().unwrap()[name].clone()
    }
}

impl ProviderFactory for ScriptedFactory {
    fn create(
        &self,
        config: &ProviderEndpointConfig,
        ids: Vec<ProviderTicker>,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let price = *self
            .prices
            .get(&config.name)
            .ok_or_else(|| ProviderError::UnknownProvider(config.name.clone()))?;
        let provider = Arc::new(ScriptedProvider {
            name: config.name.clone(),
            price,
            ids: watch::channel(ids).0,
            data: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
        });
        self.created
            .lock()
            .unwrap()
            .insert(config.name.clone(), provider.clone());
        Ok(provider)
    }
}

pub fn endpoints(names: &[&str]) -> Vec<ProviderEndpointConfig> {
    names
        .iter()
        .map(|n| ProviderEndpointConfig::new(*n, ProviderKind::Api))
        .collect()
}

/// One USD market per base, priced by every named provider
pub fn market_map(bases: &[&str], providers: &[&str]) -> MarketMap {
    MarketMap::from_markets(bases.iter().map(|base| {
        Market::new(
            Ticker::new(CurrencyPair::new(*base, "USD"), 8, 1),
            providers
                .iter()
                .map(|p| ProviderConfig::new(*p, format!("{base}-USD")))
                .collect(),
        )
    }))
}

pub fn pair(base: &str) -> CurrencyPair {
    CurrencyPair::new(base, "USD")
}

/// Poll `check` until it holds or `timeout` passes
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
