//! Graceful shutdown of the monitor.
//!
//! The sequence:
//! 1. Stops the health timer so no tick samples a half torn-down pool
//! 2. Stops the monitoring window, disconnecting every engaged handle
//! 3. Destroys every handle in the pool

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::pool::ConnectionPool;
use crate::tasks::HealthMonitor;
use crate::window::WindowScheduler;

/// Time bounds of the shutdown phases
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time allowed for the window to disconnect its handles (default: 10 seconds)
    pub window_stop_timeout: Duration,
    /// Time allowed for destroying every handle (default: 10 seconds)
    pub destroy_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            window_stop_timeout: Duration::from_secs(10),
            destroy_timeout: Duration::from_secs(10),
        }
    }
}

pub struct GracefulShutdown {
    pool: Arc<ConnectionPool>,
    window: Arc<WindowScheduler>,
    health: Arc<HealthMonitor>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        pool: Arc<ConnectionPool>,
        window: Arc<WindowScheduler>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self::with_config(pool, window, health, ShutdownConfig::default())
    }

    pub fn with_config(
        pool: Arc<ConnectionPool>,
        window: Arc<WindowScheduler>,
        health: Arc<HealthMonitor>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            pool,
            window,
            health,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_handles = self.pool.len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Stopping health monitor");
        self.health.stop();

        tracing::info!("Phase 2: Stopping monitoring window");
        result.window_stopped = match timeout(self.config.window_stop_timeout, self.window.stop()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Window stop timed out, handles will be destroyed regardless");
                false
            }
        };

        tracing::info!("Phase 3: Destroying handles");
        match timeout(self.config.destroy_timeout, self.pool.destroy_all_handles()).await {
            Ok(destroyed) => {
                result.handles_destroyed = destroyed;
                result.success = true;
            }
            Err(_) => {
                tracing::warn!(
                    remaining_handles = self.pool.len(),
                    "Handle teardown timed out"
                );
            }
        }

        result.duration = start.elapsed();

        tracing::info!(
            window_stopped = result.window_stopped,
            handles_destroyed = result.handles_destroyed,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }
}

/// Result of a graceful shutdown
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every phase finished within its bound
    pub success: bool,
    pub window_stopped: bool,
    pub handles_destroyed: usize,
    pub duration: Duration,
}
