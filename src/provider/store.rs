//! Latest-observation store owned by one provider

use crate::types::{ProviderTicker, ResolvedPrice};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Latest price per ticker, written by the worker and copied out by readers
#[derive(Debug, Clone, Default)]
pub struct PriceStore {
    inner: Arc<RwLock<HashMap<ProviderTicker, ResolvedPrice>>>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, ticker: ProviderTicker, price: ResolvedPrice) {
        let mut inner = self.inner.write().await;
        inner.insert(ticker, price);
    }

    /// Drop every entry not in `tickers`
    pub async fn retain(&self, tickers: &[ProviderTicker]) {
        let keep: HashSet<&ProviderTicker> = tickers.iter().collect();
        let mut inner = self.inner.write().await;
        inner.retain(|ticker, _| keep.contains(ticker));
    }

    pub async fn snapshot(&self) -> HashMap<ProviderTicker, ResolvedPrice> {
        self.inner.read().await.clone()
    }
}
