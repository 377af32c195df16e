//! Core value types shared by every layer of the oracle

mod pair;
mod price;

pub use pair::{CurrencyPair, PairError};
pub use price::{ProviderTicker, ResolvedPrice};
