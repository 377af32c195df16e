//! Supervised task set
//!
//! One cancellation signal plus the join handles of every task spawned
//! against it. Worker tasks, the market map sync loop and anything else
//! the oracle runs in the background live here so shutdown can cancel and
//! await all of them in one place.

mod shutdown;
mod task_set;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use task_set::TaskSet;
