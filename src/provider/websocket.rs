//! Streaming WebSocket worker

use super::{PriceStore, ProviderError, QueryHandler};
use crate::task::ShutdownSignal;
use crate::types::{ProviderTicker, ResolvedPrice};
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

/// Source-specific half of a streaming provider
pub trait WebSocketDataHandler: Send + Sync {
    /// Connection URL for a subscription set
    fn url(&self, base_url: &str, tickers: &[ProviderTicker]) -> String;

    /// Frames sent right after every (re)connect
    fn subscribe_messages(&self, tickers: &[ProviderTicker]) -> Vec<String>;

    /// Decode one text frame into the source's ticker spelling and a price.
    /// Frames that carry no price (acks, heartbeats) yield `None`.
    fn parse_message(&self, text: &str) -> Option<(String, ResolvedPrice)>;
}

/// Holds one connection for the whole subscription set.
///
/// A subscription change tears the connection down and reconnects with the
/// new set, inside the same task.
pub struct WebSocketQueryHandler<H> {
    handler: H,
    config: WsConfig,
}

impl<H: WebSocketDataHandler> WebSocketQueryHandler<H> {
    /// `config.url` is the base URL handed to [`WebSocketDataHandler::url`]
    pub fn new(handler: H, config: WsConfig) -> Self {
        Self { handler, config }
    }

    async fn handle_message(
        &self,
        provider: &str,
        msg: WsMessage,
        tickers: &[ProviderTicker],
        store: &PriceStore,
    ) {
        match msg {
            WsMessage::Text(text) => {
                let Some((symbol, price)) = self.handler.parse_message(&text) else {
                    return;
                };
                match tickers
                    .iter()
                    .find(|t| t.off_chain_ticker.eq_ignore_ascii_case(&symbol))
                {
                    Some(ticker) => store.set(ticker.clone(), price).await,
                    None => tracing::debug!(provider, symbol, "Update for unsubscribed ticker"),
                }
            }
            WsMessage::Connected => {
                tracing::info!(provider, tickers = tickers.len(), "Stream connected");
            }
            WsMessage::Reconnecting { attempt } => {
                tracing::warn!(provider, attempt, "Stream reconnecting...");
            }
            WsMessage::Binary(_) => {}
        }
    }
}

#[async_trait]
impl<H: WebSocketDataHandler + 'static> QueryHandler for WebSocketQueryHandler<H> {
    async fn run(
        &self,
        provider: &str,
        mut ids: watch::Receiver<Vec<ProviderTicker>>,
        store: PriceStore,
        shutdown: ShutdownSignal,
    ) -> Result<(), ProviderError> {
        loop {
            let tickers = ids.borrow_and_update().clone();
            if tickers.is_empty() {
                return Ok(());
            }

            let url = self.handler.url(&self.config.url, &tickers);
            let subscribe = self.handler.subscribe_messages(&tickers);
            let client = WsClient::new(self.config.clone().with_url(url));
            let (tx, mut rx) = mpsc::channel(1024);

            let connection = client.run(tx, subscribe, shutdown.clone());
            tokio::pin!(connection);

            loop {
                tokio::select! {
                    result = &mut connection => {
                        // Drain what arrived before the connection ended
                        while let Ok(msg) = rx.try_recv() {
                            self.handle_message(provider, msg, &tickers, &store).await;
                        }
                        return result.map_err(ProviderError::from);
                    }
                    Some(msg) = rx.recv() => {
                        self.handle_message(provider, msg, &tickers, &store).await;
                    }
                    changed = ids.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                        tracing::info!(provider, "Subscription set changed, resubscribing");
                        break;
                    }
                }
            }
        }
    }
}
