//! Market map fetcher contract

use super::MarketMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Identifier of the chain (or deployment) whose market map is requested
pub type ChainId = String;

/// Why a single chain id could not be resolved
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure
    #[error("request failed: {0}")]
    Request(String),
    /// Upstream answered with a non-success status
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Payload could not be decoded into a market map
    #[error("decode failed: {0}")]
    Decode(String),
    /// Local read failed
    #[error("read failed: {0}")]
    Io(String),
    /// Every underlying source failed
    #[error("all sources failed: {0:?}")]
    AllFailed(Vec<FetchError>),
}

/// Outcome of fetching one chain id
#[derive(Debug, Clone)]
pub enum FetchResult {
    Resolved {
        market_map: MarketMap,
        timestamp: DateTime<Utc>,
    },
    Unresolved(FetchError),
}

/// Per chain id results of one fetch; partial failure is expected
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub results: HashMap<ChainId, FetchResult>,
}

impl FetchResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same result for every requested id
    pub fn uniform(chain_ids: &[ChainId], result: FetchResult) -> Self {
        Self {
            results: chain_ids
                .iter()
                .map(|id| (id.clone(), result.clone()))
                .collect(),
        }
    }

    pub fn insert(&mut self, chain_id: impl Into<ChainId>, result: FetchResult) {
        self.results.insert(chain_id.into(), result);
    }

    /// The resolved map for a chain id, if any
    pub fn resolved(&self, chain_id: &str) -> Option<(&MarketMap, DateTime<Utc>)> {
        match self.results.get(chain_id)? {
            FetchResult::Resolved {
                market_map,
                timestamp,
            } => Some((market_map, *timestamp)),
            FetchResult::Unresolved(_) => None,
        }
    }

    /// The error for a chain id, if it failed
    pub fn error(&self, chain_id: &str) -> Option<&FetchError> {
        match self.results.get(chain_id)? {
            FetchResult::Unresolved(e) => Some(e),
            FetchResult::Resolved { .. } => None,
        }
    }

    pub fn resolved_count(&self) -> usize {
        self.results
            .values()
            .filter(|r| matches!(r, FetchResult::Resolved { .. }))
            .count()
    }

    /// True if every requested id resolved
    pub fn all_resolved(&self, chain_ids: &[ChainId]) -> bool {
        chain_ids.iter().all(|id| self.resolved(id).is_some())
    }
}

/// Fetches market map snapshots from one upstream
#[async_trait]
pub trait MarketMapFetcher: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Fetch a snapshot for each requested chain id
    async fn fetch(&self, chain_ids: &[ChainId]) -> FetchResponse;
}
