//! Data source providers
//!
//! A provider is one configured data source running as a worker task. All
//! providers expose the same capability surface ([`Provider`]); whether a
//! source is polled over REST or streamed over a WebSocket is decided once,
//! by the [`ProviderFactory`], and never branched on again.

mod api;
mod base;
mod binance;
mod coinbase;
mod factory;
mod store;
mod websocket;

pub use api::{ApiDataHandler, ApiQueryHandler};
pub use base::{BaseProvider, QueryHandler};
pub use binance::{BinanceTradeHandler, BINANCE_WS};
pub use coinbase::{CoinbaseSpotHandler, COINBASE_API};
pub use factory::{DefaultProviderFactory, ProviderFactory};
pub use store::PriceStore;
pub use websocket::{WebSocketDataHandler, WebSocketQueryHandler};

use crate::task::ShutdownSignal;
use crate::types::{ProviderTicker, ResolvedPrice};
use crate::ws::WsError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// How a provider obtains its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Polls a REST endpoint on an interval
    Api,
    /// Holds a streaming WebSocket connection
    WebSocket,
}

/// Provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No factory entry exists for the configured name
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    /// Endpoint configuration is unusable
    #[error("invalid config for provider {provider}: {reason}")]
    InvalidConfig { provider: String, reason: String },
    /// `start` called on a provider whose worker is live
    #[error("provider {0} is already running")]
    AlreadyRunning(String),
    /// Subscription set exceeds what the source accepts
    #[error("provider {provider} cannot serve {requested} tickers (max {max})")]
    TooManySubscriptions {
        provider: String,
        requested: usize,
        max: usize,
    },
    /// Transport-level request failure
    #[error("request failed: {0}")]
    Request(String),
    /// Upstream answered with a non-success status
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    /// Payload could not be decoded
    #[error("decode failed: {0}")]
    Decode(String),
    /// WebSocket connection gave up
    #[error(transparent)]
    WebSocket(#[from] WsError),
}

/// One configured data source.
///
/// `start` blocks until the shutdown signal fires, the subscription set
/// becomes empty, or the source fails for good. `update` atomically swaps
/// the subscription set and is safe to call while running; the worker
/// picks up the new set without restarting.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn is_running(&self) -> bool;

    async fn start(&self, shutdown: ShutdownSignal) -> Result<(), ProviderError>;

    fn get_ids(&self) -> Vec<ProviderTicker>;

    async fn update(&self, ids: Vec<ProviderTicker>) -> Result<(), ProviderError>;

    /// Latest observation per ticker; a copy, never a shared reference
    async fn get_data(&self) -> HashMap<ProviderTicker, ResolvedPrice>;
}
