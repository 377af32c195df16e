//! Provider orchestration
//!
//! Keeps the live set of provider workers consistent with the market map:
//! every market-map change is turned into per-provider subscription sets,
//! and workers are started, reconfigured or left to stop accordingly.

mod registry;
mod sync;

pub use registry::{ProviderOrchestrator, ProviderState};
pub use sync::{MarketMapSynchronizer, SyncOutcome};

use crate::marketmap::MarketMapError;
use crate::provider::ProviderError;
use thiserror::Error;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A configured source has no factory entry
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("orchestrator already initialized")]
    AlreadyInitialized,
    /// Building or reconfiguring one provider failed
    #[error("provider {provider}: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    MarketMap(#[from] MarketMapError),
}

impl OrchestratorError {
    fn provider(provider: &str, source: ProviderError) -> Self {
        match source {
            ProviderError::UnknownProvider(name) => Self::UnknownProvider(name),
            source => Self::Provider {
                provider: provider.to_string(),
                source,
            },
        }
    }
}
