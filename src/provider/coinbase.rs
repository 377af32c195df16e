//! Coinbase spot price REST source

use super::{ApiDataHandler, ProviderError};
use crate::types::{ProviderTicker, ResolvedPrice};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Provider name under which the factory builds this source
pub const COINBASE_API: &str = "coinbase_api";

/// Default public endpoint
pub const COINBASE_API_URL: &str = "https://api.coinbase.com";

#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: SpotPrice,
}

#[derive(Debug, Deserialize)]
struct SpotPrice {
    amount: String,
}

/// `GET /v2/prices/{ticker}/spot`, ticker spelled `BTC-USD`
#[derive(Debug, Default, Clone, Copy)]
pub struct CoinbaseSpotHandler;

impl ApiDataHandler for CoinbaseSpotHandler {
    fn url(&self, base_url: &str, ticker: &ProviderTicker) -> String {
        format!(
            "{}/v2/prices/{}/spot",
            base_url.trim_end_matches('/'),
            ticker.off_chain_ticker
        )
    }

    fn parse_response(
        &self,
        ticker: &ProviderTicker,
        body: &str,
    ) -> Result<ResolvedPrice, ProviderError> {
        let response: SpotResponse =
            serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let value = Decimal::from_str(&response.data.amount)
            .map_err(|e| ProviderError::Decode(format!("{ticker}: {e}")))?;

        if value <= Decimal::ZERO {
            return Err(ProviderError::Decode(format!(
                "{ticker}: non-positive price {value}"
            )));
        }

        // Spot endpoint carries no timestamp; receipt time stands in
        Ok(ResolvedPrice::new(value, Utc::now()))
    }
}
