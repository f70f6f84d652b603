//! Pool statistics and lifecycle counters

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::player::{PlayerEventKind, PlayerSnapshot, PlayerState};

/// Point-in-time counts over a set of handles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub connected: usize,
    pub playing: usize,
    pub error: usize,
    pub idle: usize,
    pub by_state: BTreeMap<PlayerState, usize>,
    pub by_type: BTreeMap<String, usize>,
}

impl PoolStats {
    pub fn from_snapshots<'a>(snapshots: impl IntoIterator<Item = &'a PlayerSnapshot>) -> Self {
        let mut stats = PoolStats {
            by_state: PlayerState::ALL.iter().map(|s| (*s, 0)).collect(),
            ..Default::default()
        };

        for snapshot in snapshots {
            stats.total += 1;
            *stats.by_state.entry(snapshot.state).or_default() += 1;
            *stats.by_type.entry(snapshot.player_type.clone()).or_default() += 1;

            if snapshot.is_connected {
                stats.connected += 1;
            }
            if snapshot.is_playing {
                stats.playing += 1;
            }
            match snapshot.state {
                PlayerState::Error => stats.error += 1,
                PlayerState::Idle => stats.idle += 1,
                _ => {}
            }
        }

        stats
    }

    pub fn count(&self, state: PlayerState) -> usize {
        self.by_state.get(&state).copied().unwrap_or(0)
    }
}

/// Lifecycle events observed by the pool's own subscriptions
#[derive(Debug, Default)]
pub struct LifecycleCounters {
    pub connected: AtomicU64,
    pub disconnected: AtomicU64,
    pub playing: AtomicU64,
    pub stopped: AtomicU64,
    pub errors: AtomicU64,
    pub retries: AtomicU64,
}

impl LifecycleCounters {
    pub fn record(&self, kind: PlayerEventKind) {
        let counter = match kind {
            PlayerEventKind::Connected => &self.connected,
            PlayerEventKind::Disconnected => &self.disconnected,
            PlayerEventKind::Playing => &self.playing,
            PlayerEventKind::Stopped => &self.stopped,
            PlayerEventKind::Error => &self.errors,
            PlayerEventKind::Retry => &self.retries,
            PlayerEventKind::StateChanged => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            connected: self.connected.load(Ordering::Relaxed),
            disconnected: self.disconnected.load(Ordering::Relaxed),
            playing: self.playing.load(Ordering::Relaxed),
            stopped: self.stopped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of lifecycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleSnapshot {
    pub connected: u64,
    pub disconnected: u64,
    pub playing: u64,
    pub stopped: u64,
    pub errors: u64,
    pub retries: u64,
}

/// Outcome of a batch operation; the batch itself never fails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}
