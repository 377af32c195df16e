use clap::Parser;
use oracle_sidecar::cli::{Cli, Commands};
use oracle_sidecar::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::parse(include_str!("../config.toml.example"))?
        }
    };

    // Initialize telemetry
    oracle_sidecar::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            args.execute(config).await?;
        }
        Commands::Validate(args) => {
            args.execute().await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!(
                "  Oracle: interval={}ms, max_age={}ms, aggregation={:?}",
                config.oracle.update_interval_ms,
                config.oracle.max_price_age_ms,
                config.oracle.aggregation
            );
            println!(
                "  Market map: initial={:?}, fetch={:?}, fallback={:?}, chain_id={}",
                config.market_map.initial_path,
                config.market_map.fetch_url,
                config.market_map.fallback_url,
                config.market_map.chain_id
            );
            for provider in &config.providers {
                println!(
                    "  Provider: {} ({:?}) {}",
                    provider.name,
                    provider.kind,
                    provider.url.as_deref().unwrap_or("default endpoint")
                );
            }
        }
    }

    Ok(())
}
