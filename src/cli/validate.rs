//! Validate command implementation

use crate::marketmap::MarketMap;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Market map JSON file
    #[arg(short, long)]
    pub market_map: PathBuf,

    /// Fail on any structural problem instead of pruning
    #[arg(long)]
    pub strict: bool,
}

impl ValidateArgs {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let market_map = MarketMap::load(&self.market_map)?;

        let valid = if self.strict {
            market_map.validate()?;
            market_map.clone()
        } else {
            market_map.valid_subset()?
        };

        println!("Market map {}:", self.market_map.display());
        println!("  Markets: {} ({} after repair)", market_map.len(), valid.len());
        println!("  Enabled: {}", valid.enabled_markets().count());
        for name in valid.provider_names() {
            println!("  Provider {}: {} tickers", name, valid.provider_tickers(&name).len());
        }
        for key in market_map.markets.keys() {
            if !valid.markets.contains_key(key) {
                println!("  Dropped: {}", key);
            }
        }
        Ok(())
    }
}
