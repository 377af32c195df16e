//! Market map fetcher backed by a local JSON file

use super::fetcher::{ChainId, FetchError, FetchResponse, FetchResult, MarketMapFetcher};
use super::MarketMap;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;

/// Reads the market map from a JSON file on every fetch.
///
/// A file carries no chain dimension, so every requested id resolves to
/// the same map.
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<MarketMap, FetchError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FetchError::Io(format!("{}: {}", self.path.display(), e)))?;
        MarketMap::from_json(&content).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MarketMapFetcher for FileFetcher {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self, chain_ids: &[ChainId]) -> FetchResponse {
        let result = match self.read().await {
            Ok(market_map) => FetchResult::Resolved {
                market_map,
                timestamp: Utc::now(),
            },
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Market map file read failed");
                FetchResult::Unresolved(e)
            }
        };
        FetchResponse::uniform(chain_ids, result)
    }
}
