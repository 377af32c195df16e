//! Binance combined trade stream source

use super::WebSocketDataHandler;
use crate::types::{ProviderTicker, ResolvedPrice};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Provider name under which the factory builds this source
pub const BINANCE_WS: &str = "binance_ws";

/// Default combined-stream endpoint
pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/stream";

/// Binance trade message structure
#[derive(Debug, Deserialize)]
struct BinanceTradeMessage {
    /// Event type
    #[serde(rename = "e")]
    event_type: String,
    /// Symbol
    #[serde(rename = "s")]
    symbol: String,
    /// Price
    #[serde(rename = "p")]
    price: String,
    /// Quantity
    #[serde(rename = "q")]
    quantity: String,
}

/// Combined stream envelope: `{"stream": "...", "data": {...}}`
#[derive(Debug, Deserialize)]
struct StreamEnvelope {
    data: BinanceTradeMessage,
}

/// Streams `{symbol}@trade` for every subscribed ticker over one connection.
/// Tickers are spelled `BTCUSDT`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinanceTradeHandler;

impl BinanceTradeHandler {
    fn stream_name(ticker: &ProviderTicker) -> String {
        format!("{}@trade", ticker.off_chain_ticker.to_lowercase())
    }

    fn decode(text: &str) -> Option<BinanceTradeMessage> {
        if let Ok(envelope) = serde_json::from_str::<StreamEnvelope>(text) {
            return Some(envelope.data);
        }
        serde_json::from_str(text).ok()
    }
}

impl WebSocketDataHandler for BinanceTradeHandler {
    fn url(&self, base_url: &str, tickers: &[ProviderTicker]) -> String {
        let streams: Vec<String> = tickers.iter().map(Self::stream_name).collect();
        format!("{}?streams={}", base_url, streams.join("/"))
    }

    fn subscribe_messages(&self, _tickers: &[ProviderTicker]) -> Vec<String> {
        // Streams are selected by the URL
        Vec::new()
    }

    fn parse_message(&self, text: &str) -> Option<(String, ResolvedPrice)> {
        let trade = Self::decode(text)?;

        if trade.event_type != "trade" {
            return None;
        }

        let price = Decimal::from_str(&trade.price).ok()?;
        if price <= Decimal::ZERO {
            return None;
        }
        let quantity = Decimal::from_str(&trade.quantity).ok()?;

        // Receipt time, so staleness measures our view of the stream
        let resolved = ResolvedPrice::new(price, Utc::now()).with_volume(quantity);
        Some((trade.symbol, resolved))
    }
}
