use std::sync::Arc;
use std::time::Instant;

use crate::context::MonitorContext;

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<MonitorContext>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(context: Arc<MonitorContext>) -> Self {
        Self {
            context,
            start_time: Instant::now(),
        }
    }
}
