//! Oracle supervisor
//!
//! Owns the task set, the orchestrator and the aggregator, and drives the
//! collect-and-aggregate loop until cancelled or stopped.

mod builder;
mod supervisor;

pub use builder::build_fetcher;
pub use supervisor::{Oracle, OracleState};

use crate::marketmap::{FetchError, MarketMapError};
use crate::orchestrator::OrchestratorError;
use thiserror::Error;

/// Supervisor errors
#[derive(Debug, Error)]
pub enum OracleError {
    /// `start` called on an oracle that already ran or was stopped
    #[error("oracle already started")]
    AlreadyStarted,
    /// The parent cancellation signal fired
    #[error("oracle cancelled")]
    Cancelled,
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("initial market map: {0}")]
    MarketMap(#[from] MarketMapError),
    #[error("market map fetcher: {0}")]
    Fetcher(#[from] FetchError),
}
