//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::health::check_health;
use crate::pool::{LifecycleSnapshot, PoolStats};
use crate::server::AppState;
use crate::window::WindowStatus;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
    /// When the last periodic check ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_periodic_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub pool: PoolStats,
    pub lifecycle: LifecycleSnapshot,
    pub assigned_rooms: usize,
    pub window: WindowStatus,
}

/// GET /health - evaluate the health rules against the live pool
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let ctx = &state.context;
    let report = check_health(&ctx.pool().stats());

    Json(HealthResponse {
        status: if report.healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        issues: report.issues,
        checked_at: report.checked_at,
        last_periodic_check: ctx.health().last_report().map(|r| r.checked_at),
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let pool = state.context.pool();

    Json(StatsResponse {
        pool: pool.stats(),
        lifecycle: pool.lifecycle(),
        assigned_rooms: pool.assigned_rooms(),
        window: state.context.window().status(),
    })
}
