//! Market map fetcher backed by an HTTP JSON endpoint

use super::fetcher::{ChainId, FetchError, FetchResponse, FetchResult, MarketMapFetcher};
use super::MarketMap;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

/// Configuration for the HTTP market map fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Endpoint returning a JSON market map
    pub url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl HttpFetcherConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Fetches the market map for each chain id with `GET {url}?chain_id={id}`
pub struct HttpFetcher {
    config: HttpFetcherConfig,
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn fetch_one(&self, chain_id: &str) -> Result<MarketMap, FetchError> {
        tracing::debug!(url = %self.config.url, chain_id, "Fetching market map");

        let response = self
            .client
            .get(&self.config.url)
            .query(&[("chain_id", chain_id)])
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        MarketMap::from_json(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MarketMapFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, chain_ids: &[ChainId]) -> FetchResponse {
        let mut response = FetchResponse::new();
        for chain_id in chain_ids {
            let result = match self.fetch_one(chain_id).await {
                Ok(market_map) => FetchResult::Resolved {
                    market_map,
                    timestamp: Utc::now(),
                },
                Err(e) => FetchResult::Unresolved(e),
            };
            response.insert(chain_id.clone(), result);
        }
        response
    }
}
