//! Process-wide monitor context: owns the pool, the window and the health
//! monitor, with explicit init and shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::credential::CredentialProvider;
use crate::directory::RoomDirectory;
use crate::error::Result;
use crate::player::PlayerFactory;
use crate::pool::{ConnectionPool, PoolOptions};
use crate::shutdown::{GracefulShutdown, ShutdownResult};
use crate::tasks::HealthMonitor;
use crate::window::WindowScheduler;

pub struct MonitorContext {
    settings: Arc<Settings>,
    pool: Arc<ConnectionPool>,
    window: Arc<WindowScheduler>,
    health: Arc<HealthMonitor>,
    shut_down: AtomicBool,
}

impl MonitorContext {
    /// Build the pool, pre-create the window's handles, load the first page
    /// of candidates and start the health monitor.
    ///
    /// A directory failure during the first load is logged, not raised.
    #[tracing::instrument(skip_all, fields(concurrent_monitors = settings.monitor.concurrent_monitors))]
    pub async fn init(
        settings: Settings,
        factory: Arc<PlayerFactory>,
        directory: Arc<dyn RoomDirectory>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        settings.validate()?;

        let pool = Arc::new(ConnectionPool::new(
            factory,
            credentials,
            PoolOptions::from_settings(&settings),
        ));
        pool.set_default_type(&settings.player.default_type)?;

        let requested = settings.monitor.concurrent_monitors;
        let created = pool.create_handles(requested, None);
        if created.is_empty() {
            tracing::error!(
                requested,
                player_type = %settings.player.default_type,
                "No handles could be created; check credential.app_id and credential.secret"
            );
        } else if created.len() < requested {
            tracing::warn!(requested, created = created.len(), "Pool is smaller than the window");
        }

        let window = Arc::new(WindowScheduler::new(
            pool.clone(),
            directory,
            requested,
            settings.monitor.page_size,
            Duration::from_millis(settings.monitor.settle_delay_ms),
        ));
        if let Err(e) = window.load_more().await {
            tracing::warn!(error = %e, "Initial room list load failed");
        }

        let health = Arc::new(HealthMonitor::new(pool.clone()));
        if settings.health.enabled {
            health.start(Duration::from_millis(settings.health.interval_ms));
        }

        tracing::info!(handles = pool.len(), "Monitor context initialized");

        Ok(Self {
            settings: Arc::new(settings),
            pool,
            window,
            health,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn window(&self) -> &Arc<WindowScheduler> {
        &self.window
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Tear everything down. Only the first call does any work; later calls
    /// return `None`.
    pub async fn shutdown(&self, reason: &str) -> Option<ShutdownResult> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            tracing::debug!("Monitor context already shut down");
            return None;
        }

        let shutdown = GracefulShutdown::new(
            self.pool.clone(),
            self.window.clone(),
            self.health.clone(),
        );
        Some(shutdown.execute(reason).await)
    }
}
