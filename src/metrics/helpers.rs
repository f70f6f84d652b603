//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::player::PlayerState;
use crate::pool::PoolStats;

use super::{
    HANDLES_BY_STATE, HANDLES_TOTAL, HANDLE_EVENTS_TOTAL, HANDLE_RETRIES_TOTAL,
    HEALTH_CHECKS_TOTAL, HEALTH_ISSUES, HEALTH_STATUS, ROOMS_CANDIDATES, ROOMS_MONITORED,
    WINDOW_CAPACITY_ERRORS_TOTAL, WINDOW_ROTATIONS_TOTAL, WINDOW_ROTATION_DURATION,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording per-handle metrics
pub struct HandleMetrics;

impl HandleMetrics {
    /// Record a lifecycle event (`connected`, `error`, ...)
    pub fn event(kind: &str) {
        HANDLE_EVENTS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a retry attempt
    pub fn retry() {
        HANDLE_RETRIES_TOTAL.inc();
    }
}

/// Helper struct for recording pool-wide gauges
pub struct PoolMetrics;

impl PoolMetrics {
    pub fn observe(stats: &PoolStats, rooms_assigned: usize) {
        HANDLES_TOTAL.set(stats.total as i64);
        for state in PlayerState::ALL {
            HANDLES_BY_STATE
                .with_label_values(&[state.as_str()])
                .set(stats.count(state) as i64);
        }
        ROOMS_MONITORED.set(rooms_assigned as i64);
    }
}

/// Helper struct for recording window scheduler metrics
pub struct WindowMetrics;

impl WindowMetrics {
    pub fn rotation(direction: &str, duration: Duration) {
        WINDOW_ROTATIONS_TOTAL.with_label_values(&[direction]).inc();
        WINDOW_ROTATION_DURATION.observe(duration.as_secs_f64());
    }

    pub fn capacity_error() {
        WINDOW_CAPACITY_ERRORS_TOTAL.inc();
    }

    pub fn monitored(count: usize) {
        ROOMS_MONITORED.set(count as i64);
    }

    pub fn candidates(count: usize) {
        ROOMS_CANDIDATES.set(count as i64);
    }
}

/// Helper struct for recording health check metrics
pub struct HealthMetrics;

impl HealthMetrics {
    pub fn record(healthy: bool, issues: usize) {
        HEALTH_CHECKS_TOTAL.inc();
        HEALTH_ISSUES.set(issues as i64);
        HEALTH_STATUS.set(if healthy { 1 } else { 0 });
    }
}
