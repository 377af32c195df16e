//! Run command implementation

use crate::config::Config;
use crate::oracle::{Oracle, OracleError};
use crate::service::OracleService;
use crate::task::Shutdown;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Initial market map, overriding `market_map.initial_path`
    #[arg(short, long)]
    pub market_map: Option<PathBuf>,

    /// Seconds between price reports in the log
    #[arg(long, default_value_t = 10)]
    pub report_interval_secs: u64,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if let Some(path) = &self.market_map {
            config.market_map.initial_path = Some(path.clone());
        }

        let oracle = Arc::new(Oracle::from_config(&config)?);
        let service = OracleService::new(&oracle);
        tracing::info!(
            version = %service.version().version,
            providers = config.providers.len(),
            "Starting oracle"
        );

        let parent = Shutdown::new();
        let runner = oracle.clone();
        let signal = parent.subscribe();
        let mut handle = tokio::spawn(async move { runner.start(signal).await });

        let mut report = tokio::time::interval(Duration::from_secs(self.report_interval_secs.max(1)));
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl-C, shutting down");
                    parent.trigger();
                    break;
                }
                result = &mut handle => {
                    return finish(result?);
                }
                _ = report.tick() => {
                    let prices = service.prices().await;
                    tracing::info!(
                        pairs = prices.prices.len(),
                        prices = ?prices.prices,
                        "Aggregated prices"
                    );
                }
            }
        }

        finish(handle.await?)
    }
}

fn finish(result: Result<(), OracleError>) -> anyhow::Result<()> {
    match result {
        Ok(()) | Err(OracleError::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
