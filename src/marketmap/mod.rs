//! Market map module
//!
//! The market map is the declarative configuration that decides which
//! currency pairs are priced and which sources (and quirks) price them.
//! This module holds the map types, their validation/repair rules, and the
//! fetchers that load candidate maps from upstreams.

mod failover;
mod fetcher;
mod file;
mod http;
mod types;

pub use failover::{FailoverFetcher, UnionFetcher, DEFAULT_FAILOVER_THRESHOLD};
pub use fetcher::{ChainId, FetchError, FetchResponse, FetchResult, MarketMapFetcher};
pub use file::FileFetcher;
pub use http::{HttpFetcher, HttpFetcherConfig};
pub use types::{Market, MarketMap, MarketMapError, ProviderConfig, Ticker, MAX_DECIMALS};
