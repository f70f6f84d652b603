//! Periodic health sampling of the connection pool

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::health::{check_health, HealthReport};
use crate::metrics::HealthMetrics;
use crate::pool::ConnectionPool;

use super::timer::PeriodicTimer;

/// Default interval between health checks
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_millis(30_000);

pub type ReportCallback = Arc<dyn Fn(&HealthReport) + Send + Sync>;

/// Token returned by [`HealthMonitor::on_report`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Samples pool statistics on a timer and dispatches reports to observers
pub struct HealthMonitor {
    pool: Arc<ConnectionPool>,
    observers: Arc<RwLock<Vec<(ObserverId, ReportCallback)>>>,
    next_observer: AtomicU64,
    timer: Mutex<Option<PeriodicTimer>>,
    last_report: Arc<RwLock<Option<HealthReport>>>,
}

impl HealthMonitor {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            observers: Arc::new(RwLock::new(Vec::new())),
            next_observer: AtomicU64::new(1),
            timer: Mutex::new(None),
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    /// Start ticking every `interval`, replacing any running timer
    pub fn start(&self, interval: Duration) {
        let pool = self.pool.clone();
        let observers = self.observers.clone();
        let last_report = self.last_report.clone();

        let timer = PeriodicTimer::start(interval, move || {
            let report = run_check(&pool, &observers, &last_report);
            tracing::trace!(healthy = report.healthy, "Health tick");
            async {}
        });

        let previous = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(timer);
        if let Some(previous) = previous {
            previous.cancel();
        }

        tracing::info!(interval_ms = interval.as_millis() as u64, "Health monitor started");
    }

    /// Cancel the timer. Idempotent.
    pub fn stop(&self) {
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(timer) = timer {
            timer.cancel();
            tracing::info!("Health monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|timer| !timer.is_cancelled())
    }

    /// Run a check immediately and dispatch it like a timer tick
    pub fn check_now(&self) -> HealthReport {
        run_check(&self.pool, &self.observers, &self.last_report)
    }

    pub fn last_report(&self) -> Option<HealthReport> {
        self.last_report
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn on_report<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&HealthReport) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    pub fn off_report(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_check(
    pool: &ConnectionPool,
    observers: &RwLock<Vec<(ObserverId, ReportCallback)>>,
    last_report: &RwLock<Option<HealthReport>>,
) -> HealthReport {
    let report = check_health(&pool.stats());
    HealthMetrics::record(report.healthy, report.issues.len());

    if !report.healthy {
        tracing::warn!(issues = ?report.issues, "Health issues detected");
    }

    let callbacks: Vec<ReportCallback> = observers
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .map(|(_, cb)| cb.clone())
        .collect();

    for callback in callbacks {
        if catch_unwind(AssertUnwindSafe(|| callback(&report))).is_err() {
            tracing::error!("Health observer panicked");
        }
    }

    *last_report.write().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::AnonymousCredentialProvider;
    use crate::player::PlayerFactory;
    use crate::pool::PoolOptions;
    use std::sync::atomic::AtomicUsize;

    fn monitor_with_handles(count: usize) -> HealthMonitor {
        let pool = Arc::new(ConnectionPool::new(
            Arc::new(PlayerFactory::with_defaults()),
            Arc::new(AnonymousCredentialProvider),
            PoolOptions::default(),
        ));
        pool.create_handles(count, None);
        HealthMonitor::new(pool)
    }

    #[tokio::test]
    async fn test_check_now_flags_idle_pool() {
        let monitor = monitor_with_handles(7);
        let report = monitor.check_now();

        assert!(!report.healthy);
        assert!(report.issues.iter().any(|i| i.starts_with("High idle rate")));
        assert!(report.issues.iter().any(|i| i.starts_with("Low connection rate")));
        assert!(monitor.last_report().is_some());
    }

    #[tokio::test]
    async fn test_observer_panic_does_not_block_others() {
        let monitor = monitor_with_handles(1);
        let delivered = Arc::new(AtomicUsize::new(0));

        monitor.on_report(|_| panic!("observer failure"));
        let counter = delivered.clone();
        let id = monitor.on_report(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.check_now();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        assert!(monitor.off_report(id));
        monitor.check_now();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks_and_idempotent_stop() {
        let monitor = monitor_with_handles(2);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        monitor.on_report(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.start(Duration::from_secs(30));
        assert!(monitor.is_running());

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        // Restarting replaces the timer instead of adding a second one
        monitor.start(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
    }
}
