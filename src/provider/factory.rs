//! Builds providers from endpoint configuration

use super::binance::BINANCE_WS_URL;
use super::coinbase::COINBASE_API_URL;
use super::{
    ApiQueryHandler, BaseProvider, BinanceTradeHandler, CoinbaseSpotHandler, Provider,
    ProviderError, ProviderKind, QueryHandler, WebSocketQueryHandler, BINANCE_WS, COINBASE_API,
};
use crate::config::ProviderEndpointConfig;
use crate::types::ProviderTicker;
use crate::ws::WsConfig;
use std::sync::Arc;

/// Turns a configured source into a worker seeded with its tickers
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        config: &ProviderEndpointConfig,
        ids: Vec<ProviderTicker>,
    ) -> Result<Arc<dyn Provider>, ProviderError>;
}

/// Knows the built-in sources by name
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProviderFactory;

impl DefaultProviderFactory {
    fn expect_kind(config: &ProviderEndpointConfig, kind: ProviderKind) -> Result<(), ProviderError> {
        if config.kind != kind {
            return Err(ProviderError::InvalidConfig {
                provider: config.name.clone(),
                reason: format!("expected kind {:?}, got {:?}", kind, config.kind),
            });
        }
        Ok(())
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn create(
        &self,
        config: &ProviderEndpointConfig,
        ids: Vec<ProviderTicker>,
    ) -> Result<Arc<dyn Provider>, ProviderError> {
        let handler: Box<dyn QueryHandler> = match config.name.as_str() {
            COINBASE_API => {
                Self::expect_kind(config, ProviderKind::Api)?;
                let url = config.url.as_deref().unwrap_or(COINBASE_API_URL);
                Box::new(ApiQueryHandler::new(
                    CoinbaseSpotHandler,
                    url,
                    config.interval(),
                    config.timeout(),
                )?)
            }
            BINANCE_WS => {
                Self::expect_kind(config, ProviderKind::WebSocket)?;
                let url = config.url.as_deref().unwrap_or(BINANCE_WS_URL);
                let ws = WsConfig::new(url).max_reconnects(config.max_reconnects);
                Box::new(WebSocketQueryHandler::new(BinanceTradeHandler, ws))
            }
            other => return Err(ProviderError::UnknownProvider(other.to_string())),
        };

        if ids.len() > config.max_subscriptions {
            return Err(ProviderError::TooManySubscriptions {
                provider: config.name.clone(),
                requested: ids.len(),
                max: config.max_subscriptions,
            });
        }

        tracing::debug!(provider = %config.name, kind = ?config.kind, tickers = ids.len(), "Provider created");
        Ok(Arc::new(BaseProvider::new(
            config.name.clone(),
            config.kind,
            handler,
            ids,
            config.max_subscriptions,
        )))
    }
}
