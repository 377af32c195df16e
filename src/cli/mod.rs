//! CLI interface for the oracle sidecar
//!
//! Provides subcommands for:
//! - `run`: Start the oracle until Ctrl-C
//! - `validate`: Check a market map file
//! - `config`: Show the effective configuration

mod run;
mod validate;

pub use run::RunArgs;
pub use validate::ValidateArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "oracle-sidecar")]
#[command(about = "Sidecar price oracle: aggregated prices from many data sources")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the oracle
    Run(RunArgs),
    /// Validate a market map file
    Validate(ValidateArgs),
    /// Show the effective configuration
    Config,
}
