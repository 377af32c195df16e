//! Price aggregation
//!
//! Each tick the supervisor resets the aggregator, contributes every
//! provider's fresh observations and asks for a new snapshot. The market
//! map decides which provider tickers feed which pair and how to convert
//! them (invert, normalize-by).

mod engine;
mod math;
mod types;

pub use engine::PriceAggregator;
pub use math::{median, tvwap, vwap};
pub use types::{AggregationError, PriceSnapshot};
