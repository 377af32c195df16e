//! In-process query surface
//!
//! Response types are plain serde structs so an outer transport can expose
//! them unchanged.

use crate::aggregator::PriceAggregator;
use crate::marketmap::MarketMap;
use crate::oracle::Oracle;
use crate::orchestrator::ProviderOrchestrator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Aggregated prices as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricesResponse {
    /// Pair string (`BASE/QUOTE`) to price rounded to the ticker's decimals
    pub prices: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMapResponse {
    pub market_map: MarketMap,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionResponse {
    pub version: String,
}

/// Read-only view over a running oracle
#[derive(Clone)]
pub struct OracleService {
    aggregator: Arc<PriceAggregator>,
    orchestrator: Arc<ProviderOrchestrator>,
}

impl OracleService {
    pub fn new(oracle: &Oracle) -> Self {
        Self {
            aggregator: oracle.aggregator().clone(),
            orchestrator: oracle.orchestrator().clone(),
        }
    }

    /// Latest snapshot; pairs no longer in the market map are left out
    pub async fn prices(&self) -> PricesResponse {
        let snapshot = self.aggregator.get_prices().await;
        let market_map = self.orchestrator.market_map().await;

        let prices = snapshot
            .prices
            .iter()
            .filter_map(|(pair, price)| {
                let market = market_map.get(pair)?;
                let rounded = price.round_dp(market.ticker.decimals);
                Some((pair.to_string(), rounded.to_string()))
            })
            .collect();

        PricesResponse {
            prices,
            timestamp: snapshot.timestamp,
        }
    }

    pub async fn market_map(&self) -> MarketMapResponse {
        MarketMapResponse {
            market_map: (*self.orchestrator.market_map().await).clone(),
            last_sync: self.orchestrator.last_sync().await,
        }
    }

    pub fn version(&self) -> VersionResponse {
        VersionResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
