//! Threshold rules over pool statistics

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pool::PoolStats;

/// Idle share above which the pool is flagged
pub const HIGH_IDLE_RATE: f64 = 0.8;
/// Minimum pool size before the idle rule applies
pub const HIGH_IDLE_MIN_TOTAL: usize = 5;
/// Connected share below which the pool is flagged
pub const LOW_CONNECTION_RATE: f64 = 0.5;
/// Minimum pool size before the connection rule applies
pub const LOW_CONNECTION_MIN_TOTAL: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub stats: PoolStats,
    pub checked_at: DateTime<Utc>,
}

/// Evaluate the health rules against one stats snapshot.
///
/// Ratio rules never fire on an empty pool.
pub fn check_health(stats: &PoolStats) -> HealthReport {
    let mut issues = Vec::new();

    if stats.error > 0 {
        issues.push(format!("{} players in error state", stats.error));
    }

    if stats.total > 0 {
        let total = stats.total as f64;

        let idle_rate = stats.idle as f64 / total;
        if idle_rate > HIGH_IDLE_RATE && stats.total > HIGH_IDLE_MIN_TOTAL {
            issues.push(format!("High idle rate: {}%", percent(idle_rate)));
        }

        let connected_rate = stats.connected as f64 / total;
        if connected_rate < LOW_CONNECTION_RATE && stats.total > LOW_CONNECTION_MIN_TOTAL {
            issues.push(format!("Low connection rate: {}%", percent(connected_rate)));
        }
    }

    HealthReport {
        healthy: issues.is_empty(),
        issues,
        stats: stats.clone(),
        checked_at: Utc::now(),
    }
}

fn percent(rate: f64) -> i64 {
    (rate * 100.0).round() as i64
}
