//! Background timers and the periodic health monitor

mod monitor;
mod timer;

pub use monitor::{HealthMonitor, ObserverId, ReportCallback, DEFAULT_HEALTH_INTERVAL};
pub use timer::{OneShotTimer, PeriodicTimer};
