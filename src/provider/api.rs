//! Polling REST worker

use super::{PriceStore, ProviderError, QueryHandler};
use crate::task::ShutdownSignal;
use crate::telemetry::{increment_provider_counter, CounterMetric};
use crate::types::{ProviderTicker, ResolvedPrice};
use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::watch;

/// Source-specific half of a REST provider: where to ask and how to read
/// the answer
pub trait ApiDataHandler: Send + Sync {
    /// Full request URL for one ticker
    fn url(&self, base_url: &str, ticker: &ProviderTicker) -> String;

    /// Decode one response body
    fn parse_response(
        &self,
        ticker: &ProviderTicker,
        body: &str,
    ) -> Result<ResolvedPrice, ProviderError>;
}

/// Polls every subscribed ticker once per interval, one request each.
///
/// A failed ticker is logged and counted; it never blocks the others.
pub struct ApiQueryHandler<H> {
    handler: H,
    client: Client,
    base_url: String,
    interval: Duration,
}

impl<H: ApiDataHandler> ApiQueryHandler<H> {
    pub fn new(
        handler: H,
        base_url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self {
            handler,
            client,
            base_url: base_url.into(),
            interval,
        })
    }

    async fn fetch(&self, ticker: &ProviderTicker) -> Result<ResolvedPrice, ProviderError> {
        let url = self.handler.url(&self.base_url, ticker);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        self.handler.parse_response(ticker, &body)
    }

    async fn poll(&self, provider: &str, tickers: &[ProviderTicker], store: &PriceStore) {
        let results = join_all(tickers.iter().map(|t| self.fetch(t))).await;

        for (ticker, result) in tickers.iter().zip(results) {
            match result {
                Ok(price) => store.set(ticker.clone(), price).await,
                Err(e) => {
                    tracing::warn!(provider, ticker = %ticker, error = %e, "Price request failed");
                    increment_provider_counter(CounterMetric::ProviderErrors, provider, 1);
                }
            }
        }
    }
}

#[async_trait]
impl<H: ApiDataHandler + 'static> QueryHandler for ApiQueryHandler<H> {
    async fn run(
        &self,
        provider: &str,
        mut ids: watch::Receiver<Vec<ProviderTicker>>,
        store: PriceStore,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ProviderError> {
        loop {
            let tickers = ids.borrow_and_update().clone();
            if tickers.is_empty() {
                return Ok(());
            }

            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                _ = self.poll(provider, &tickers, &store) => {}
            }

            tokio::select! {
                _ = shutdown.recv() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
                changed = ids.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
