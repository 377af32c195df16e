//! Fetcher combinators: permanent failover and union of two sources

use super::fetcher::{ChainId, FetchError, FetchResponse, FetchResult, MarketMapFetcher};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Consecutive secondary successes required before switching over
pub const DEFAULT_FAILOVER_THRESHOLD: u32 = 10;

/// Serves from a primary source, probing a secondary one while it fails.
///
/// Once the secondary has resolved every requested id `threshold` times in
/// a row during primary outages, the fetcher switches to it permanently.
/// A primary recovery or a secondary miss resets the streak.
pub struct FailoverFetcher {
    primary: Arc<dyn MarketMapFetcher>,
    secondary: Arc<dyn MarketMapFetcher>,
    threshold: u32,
    streak: AtomicU32,
    switched: AtomicBool,
}

impl FailoverFetcher {
    pub fn new(primary: Arc<dyn MarketMapFetcher>, secondary: Arc<dyn MarketMapFetcher>) -> Self {
        Self::with_threshold(primary, secondary, DEFAULT_FAILOVER_THRESHOLD)
    }

    pub fn with_threshold(
        primary: Arc<dyn MarketMapFetcher>,
        secondary: Arc<dyn MarketMapFetcher>,
        threshold: u32,
    ) -> Self {
        Self {
            primary,
            secondary,
            threshold: threshold.max(1),
            streak: AtomicU32::new(0),
            switched: AtomicBool::new(false),
        }
    }

    /// True once the secondary has taken over
    pub fn has_switched(&self) -> bool {
        self.switched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketMapFetcher for FailoverFetcher {
    fn name(&self) -> &str {
        "failover"
    }

    async fn fetch(&self, chain_ids: &[ChainId]) -> FetchResponse {
        if self.has_switched() {
            return self.secondary.fetch(chain_ids).await;
        }

        let response = self.primary.fetch(chain_ids).await;
        if response.all_resolved(chain_ids) {
            self.streak.store(0, Ordering::SeqCst);
            return response;
        }

        let probe = self.secondary.fetch(chain_ids).await;
        if !probe.all_resolved(chain_ids) {
            self.streak.store(0, Ordering::SeqCst);
            return response;
        }

        let streak = self.streak.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(
            primary = self.primary.name(),
            secondary = self.secondary.name(),
            streak,
            "Primary market map source failed, serving secondary"
        );
        if streak >= self.threshold {
            self.switched.store(true, Ordering::SeqCst);
            tracing::info!(
                primary = self.primary.name(),
                secondary = self.secondary.name(),
                "Switching market map source to secondary"
            );
        }
        probe
    }
}

/// Unions the maps of two sources by market key.
///
/// On key collisions the first source wins. A chain id resolves if either
/// source resolved it.
pub struct UnionFetcher {
    first: Arc<dyn MarketMapFetcher>,
    second: Arc<dyn MarketMapFetcher>,
}

impl UnionFetcher {
    pub fn new(first: Arc<dyn MarketMapFetcher>, second: Arc<dyn MarketMapFetcher>) -> Self {
        Self { first, second }
    }
}

#[async_trait]
impl MarketMapFetcher for UnionFetcher {
    fn name(&self) -> &str {
        "union"
    }

    async fn fetch(&self, chain_ids: &[ChainId]) -> FetchResponse {
        let (mut first, mut second) =
            tokio::join!(self.first.fetch(chain_ids), self.second.fetch(chain_ids));

        let mut response = FetchResponse::new();
        for chain_id in chain_ids {
            let a = first.results.remove(chain_id);
            let b = second.results.remove(chain_id);

            let merged = match (a, b) {
                (
                    Some(FetchResult::Resolved {
                        mut market_map,
                        timestamp: ts_a,
                    }),
                    Some(FetchResult::Resolved {
                        market_map: other,
                        timestamp: ts_b,
                    }),
                ) => {
                    for (key, market) in other.markets {
                        market_map.markets.entry(key).or_insert(market);
                    }
                    FetchResult::Resolved {
                        market_map,
                        timestamp: ts_a.max(ts_b),
                    }
                }
                (Some(resolved @ FetchResult::Resolved { .. }), _)
                | (_, Some(resolved @ FetchResult::Resolved { .. })) => resolved,
                (a, b) => {
                    let errors = [a, b]
                        .into_iter()
                        .flatten()
                        .filter_map(|r| match r {
                            FetchResult::Unresolved(e) => Some(e),
                            FetchResult::Resolved { .. } => None,
                        })
                        .collect();
                    FetchResult::Unresolved(FetchError::AllFailed(errors))
                }
            };
            response.insert(chain_id.clone(), merged);
        }
        response
    }
}
