//! Prometheus metrics for the live room monitor.
//!
//! - Handle metrics (handles per state, lifecycle events, retries)
//! - Window metrics (rotations, rotation latency, rooms monitored)
//! - Health metrics (checks run, current issues)

mod helpers;

pub use helpers::{encode_metrics, HandleMetrics, HealthMetrics, PoolMetrics, WindowMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "monitor";

lazy_static! {
    // ============================================================================
    // Handle Metrics
    // ============================================================================

    /// Handles per lifecycle state
    pub static ref HANDLES_BY_STATE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_handles", METRIC_PREFIX),
        "Number of handles per lifecycle state",
        &["state"]
    ).unwrap();

    /// Total handles in the pool
    pub static ref HANDLES_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_handles_total", METRIC_PREFIX),
        "Total number of handles in the pool"
    ).unwrap();

    /// Lifecycle events emitted by handles
    pub static ref HANDLE_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_handle_events_total", METRIC_PREFIX),
        "Lifecycle events emitted by handles",
        &["kind"]
    ).unwrap();

    /// Retry attempts started
    pub static ref HANDLE_RETRIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_handle_retries_total", METRIC_PREFIX),
        "Total automatic retry attempts"
    ).unwrap();

    // ============================================================================
    // Window Metrics
    // ============================================================================

    /// Window rotations by direction
    pub static ref WINDOW_ROTATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_window_rotations_total", METRIC_PREFIX),
        "Window rotations by direction",
        &["direction"]
    ).unwrap();

    /// Rotations aborted for lack of handles
    pub static ref WINDOW_CAPACITY_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_window_capacity_errors_total", METRIC_PREFIX),
        "Rotations aborted because the pool was smaller than the window"
    ).unwrap();

    /// Rotation duration in seconds
    pub static ref WINDOW_ROTATION_DURATION: Histogram = register_histogram!(
        format!("{}_window_rotation_duration_seconds", METRIC_PREFIX),
        "Time to tear down and rebuild the monitoring window",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Rooms currently monitored
    pub static ref ROOMS_MONITORED: IntGauge = register_int_gauge!(
        format!("{}_rooms_monitored", METRIC_PREFIX),
        "Number of rooms currently assigned to a handle"
    ).unwrap();

    /// Candidate rooms loaded from the directory
    pub static ref ROOMS_CANDIDATES: IntGauge = register_int_gauge!(
        format!("{}_rooms_candidates", METRIC_PREFIX),
        "Number of candidate rooms loaded from the directory"
    ).unwrap();

    // ============================================================================
    // Health Metrics
    // ============================================================================

    /// Health checks run
    pub static ref HEALTH_CHECKS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_health_checks_total", METRIC_PREFIX),
        "Total health checks run"
    ).unwrap();

    /// Issues found by the latest health check
    pub static ref HEALTH_ISSUES: IntGauge = register_int_gauge!(
        format!("{}_health_issues", METRIC_PREFIX),
        "Issues found by the latest health check"
    ).unwrap();

    /// 1 when the latest health check passed
    pub static ref HEALTH_STATUS: IntGauge = register_int_gauge!(
        format!("{}_health_status", METRIC_PREFIX),
        "Latest health check result (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}
