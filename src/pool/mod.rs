//! Connection pool: handle ownership, room assignment and statistics

mod manager;
mod stats;

pub use manager::{ConnectionPool, PoolOptions};
pub use stats::{BatchReport, LifecycleCounters, LifecycleSnapshot, PoolStats};
