use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;

use crate::directory::{DestroyRoomResult, RoomDirectory, RoomInfo};
use crate::error::{AppError, Result};
use crate::metrics::WindowMetrics;
use crate::player::{DisplayTarget, HandleId, RoomConfig};
use crate::pool::ConnectionPool;

use super::range::{compute_range, next_start, prev_start};

/// Cursor of the first directory page
const FIRST_CURSOR: &str = "0";

/// What triggered a window rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationDirection {
    Start,
    Next,
    Prev,
    Refresh,
}

impl RotationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationDirection::Start => "start",
            RotationDirection::Next => "next",
            RotationDirection::Prev => "prev",
            RotationDirection::Refresh => "refresh",
        }
    }
}

/// Outcome of one full teardown/rebuild
#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    pub direction: RotationDirection,
    pub start: usize,
    pub end: usize,
    /// Rooms now monitored, in window order
    pub monitored: Vec<String>,
    /// Rooms of the window that could not be connected
    pub failed: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowStatus {
    pub total: usize,
    pub start: usize,
    pub end: usize,
    pub capacity: usize,
    pub monitored: Vec<String>,
    pub exhausted: bool,
    pub loading: bool,
}

#[derive(Debug)]
struct WindowState {
    candidates: Vec<RoomInfo>,
    cursor: String,
    exhausted: bool,
    start: usize,
    monitored: Vec<String>,
    /// Handles assigned by the last rotation, connected or not
    engaged: Vec<HandleId>,
}

impl WindowState {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            cursor: FIRST_CURSOR.to_string(),
            exhausted: false,
            start: 0,
            monitored: Vec::new(),
            engaged: Vec::new(),
        }
    }
}

/// Assigns a sliding window of candidate rooms to the pool's handles.
///
/// Every rotation is a full rebuild: all engaged handles are disconnected,
/// the settle delay elapses, then each window slot is connected afresh.
pub struct WindowScheduler {
    pool: Arc<ConnectionPool>,
    directory: Arc<dyn RoomDirectory>,
    capacity: usize,
    page_size: usize,
    settle_delay: Duration,
    state: tokio::sync::Mutex<WindowState>,
    /// Last published status, readable while an operation holds `state`
    status: RwLock<WindowStatus>,
    busy: AtomicBool,
}

impl WindowScheduler {
    pub fn new(
        pool: Arc<ConnectionPool>,
        directory: Arc<dyn RoomDirectory>,
        capacity: usize,
        page_size: usize,
        settle_delay: Duration,
    ) -> Self {
        Self {
            pool,
            directory,
            capacity,
            page_size,
            settle_delay,
            state: tokio::sync::Mutex::new(WindowState::new()),
            status: RwLock::new(WindowStatus {
                capacity,
                ..Default::default()
            }),
            busy: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn status(&self) -> WindowStatus {
        let mut status = self.status.read().unwrap_or_else(|e| e.into_inner()).clone();
        status.loading = self.busy.load(Ordering::Acquire);
        status
    }

    pub async fn candidates(&self) -> Vec<RoomInfo> {
        self.state.lock().await.candidates.clone()
    }

    // ------------------------------------------------------------------
    // Candidate list
    // ------------------------------------------------------------------

    /// Append the next directory page. Returns the number of new rooms; a
    /// no-op once the directory is exhausted.
    #[tracing::instrument(skip(self))]
    pub async fn load_more(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let _busy = BusyGuard::new(&self.busy);
        let added = self.fetch_page(&mut state).await?;
        self.publish(&state);
        Ok(added)
    }

    /// Stop monitoring, drop every candidate and fetch the first page again
    #[tracing::instrument(skip(self))]
    pub async fn reload(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let _busy = BusyGuard::new(&self.busy);

        self.teardown(&mut state).await;
        *state = WindowState::new();

        let added = self.fetch_page(&mut state).await;
        self.publish(&state);
        added
    }

    async fn fetch_page(&self, state: &mut WindowState) -> Result<usize> {
        if state.exhausted {
            tracing::debug!("Room directory exhausted, nothing to load");
            return Ok(0);
        }

        tracing::debug!(cursor = %state.cursor, count = self.page_size, "Fetching rooms");
        let page = self.directory.list_rooms(&state.cursor, self.page_size).await?;

        let before = state.candidates.len();
        for room in page.rooms {
            if !state.candidates.iter().any(|c| c.room_id == room.room_id) {
                state.candidates.push(room);
            }
        }
        let added = state.candidates.len() - before;

        if page.next_cursor.is_empty() {
            state.exhausted = true;
        } else {
            state.cursor = page.next_cursor;
        }

        WindowMetrics::candidates(state.candidates.len());
        tracing::info!(
            added,
            total = state.candidates.len(),
            next_cursor = %state.cursor,
            exhausted = state.exhausted,
            "Candidate rooms updated"
        );
        Ok(added)
    }

    // ------------------------------------------------------------------
    // Rotation
    // ------------------------------------------------------------------

    /// Apply the current window
    pub async fn start(&self) -> Result<RotationReport> {
        let mut state = self.state.lock().await;
        let start = state.start;
        self.rotate(&mut state, start, RotationDirection::Start).await
    }

    pub async fn next(&self) -> Result<RotationReport> {
        let mut state = self.state.lock().await;
        let start = next_start(state.candidates.len(), self.capacity, state.start);
        self.rotate(&mut state, start, RotationDirection::Next).await
    }

    pub async fn prev(&self) -> Result<RotationReport> {
        let mut state = self.state.lock().await;
        let start = prev_start(state.candidates.len(), self.capacity, state.start);
        self.rotate(&mut state, start, RotationDirection::Prev).await
    }

    pub async fn refresh(&self) -> Result<RotationReport> {
        let mut state = self.state.lock().await;
        let start = state.start;
        self.rotate(&mut state, start, RotationDirection::Refresh).await
    }

    /// Disconnect every engaged handle and clear the monitored set
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let _busy = BusyGuard::new(&self.busy);
        self.teardown(&mut state).await;
        self.publish(&state);
    }

    /// Destroy a room remotely, drop it from the candidates and rebuild the
    /// window if it was being monitored
    #[tracing::instrument(skip(self))]
    pub async fn destroy_room(&self, room_id: &str) -> Result<DestroyRoomResult> {
        let result = self.directory.destroy_room(room_id).await?;
        if !result.is_success() {
            tracing::warn!(code = result.code, message = %result.message, "Room destroy rejected");
            return Ok(result);
        }

        let mut state = self.state.lock().await;
        state.candidates.retain(|room| room.room_id != room_id);
        WindowMetrics::candidates(state.candidates.len());

        if state.monitored.iter().any(|monitored| monitored == room_id) {
            let start = state.start;
            if let Err(e) = self.rotate(&mut state, start, RotationDirection::Refresh).await {
                tracing::warn!(error = %e, "Failed to rebuild window after room destroy");
            }
        } else {
            self.publish(&state);
        }

        Ok(result)
    }

    async fn rotate(
        &self,
        state: &mut WindowState,
        requested_start: usize,
        direction: RotationDirection,
    ) -> Result<RotationReport> {
        let _busy = BusyGuard::new(&self.busy);
        let started = Instant::now();

        let (start, end) = compute_range(state.candidates.len(), self.capacity, requested_start);
        let rooms: Vec<String> = state.candidates[start..end]
            .iter()
            .map(|room| room.room_id.clone())
            .collect();

        let handles = self.pool.handle_ids();
        if handles.len() < rooms.len() {
            WindowMetrics::capacity_error();
            tracing::warn!(
                required = rooms.len(),
                available = handles.len(),
                "Not enough handles for window"
            );
            return Err(AppError::Capacity {
                required: rooms.len(),
                available: handles.len(),
            });
        }

        state.start = start;
        self.teardown(state).await;

        let assignments: Vec<(HandleId, String)> = handles.into_iter().zip(rooms).collect();
        let results = join_all(assignments.iter().enumerate().map(|(slot, (id, room_id))| {
            async move {
                self.pool
                    .update_target(id, DisplayTarget::slot(start + slot))
                    .await?;
                self.pool
                    .connect_to_room(id, RoomConfig::new(room_id.clone()))
                    .await
            }
        }))
        .await;

        let mut monitored = Vec::new();
        let mut failed = Vec::new();
        for ((id, room_id), result) in assignments.iter().zip(results) {
            match result {
                Ok(()) => monitored.push(room_id.clone()),
                Err(e) => {
                    tracing::warn!(
                        handle_id = %id,
                        room_id = %room_id,
                        error = %e,
                        "Failed to connect window slot"
                    );
                    failed.push(room_id.clone());
                }
            }
        }

        state.engaged = assignments.into_iter().map(|(id, _)| id).collect();
        state.monitored = monitored.clone();
        self.publish(state);

        let elapsed = started.elapsed();
        WindowMetrics::rotation(direction.as_str(), elapsed);
        WindowMetrics::monitored(monitored.len());
        tracing::info!(
            direction = direction.as_str(),
            start,
            end,
            monitored = monitored.len(),
            failed = failed.len(),
            "Window rotated"
        );

        Ok(RotationReport {
            direction,
            start,
            end,
            monitored,
            failed,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    /// Disconnect the handles of the previous rotation and wait for the
    /// transport to settle
    async fn teardown(&self, state: &mut WindowState) {
        if state.engaged.is_empty() {
            return;
        }

        let engaged = std::mem::take(&mut state.engaged);
        let report = self.pool.disconnect_from_rooms(&engaged).await;
        state.monitored.clear();
        WindowMetrics::monitored(0);

        tracing::debug!(
            disconnected = report.success_count(),
            failed = report.failure_count(),
            "Window torn down"
        );
        tokio::time::sleep(self.settle_delay).await;
    }

    fn publish(&self, state: &WindowState) {
        let (start, end) = compute_range(state.candidates.len(), self.capacity, state.start);
        *self.status.write().unwrap_or_else(|e| e.into_inner()) = WindowStatus {
            total: state.candidates.len(),
            start,
            end,
            capacity: self.capacity,
            monitored: state.monitored.clone(),
            exhausted: state.exhausted,
            loading: false,
        };
    }
}

/// Marks the scheduler busy for the guard's lifetime
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::AnonymousCredentialProvider;
    use crate::directory::StaticRoomDirectory;
    use crate::player::{PlayerFactory, PlayerState, RetryPolicy};
    use crate::pool::PoolOptions;
    use crate::transport::{LoopbackBehavior, LoopbackTransport, Transport};

    fn setup(
        rooms: usize,
        handles: usize,
        capacity: usize,
    ) -> (WindowScheduler, Arc<ConnectionPool>) {
        let factory = PlayerFactory::new();
        factory.register("loopback", |_| {
            Ok(Arc::new(LoopbackTransport::new(LoopbackBehavior::silent())) as Arc<dyn Transport>)
        });

        let pool = Arc::new(ConnectionPool::new(
            Arc::new(factory),
            Arc::new(AnonymousCredentialProvider),
            PoolOptions {
                retry: RetryPolicy {
                    auto_retry: false,
                    ..RetryPolicy::default()
                },
                ..PoolOptions::default()
            },
        ));
        pool.create_handles(handles, None);

        let directory = Arc::new(StaticRoomDirectory::with_generated(rooms));
        let scheduler = WindowScheduler::new(
            pool.clone(),
            directory,
            capacity,
            14,
            Duration::from_millis(200),
        );
        (scheduler, pool)
    }

    fn room_ids(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("room_{}", i)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_more_pages_until_exhausted() {
        let (scheduler, _pool) = setup(30, 7, 7);

        assert_eq!(scheduler.load_more().await.unwrap(), 14);
        assert_eq!(scheduler.load_more().await.unwrap(), 14);
        assert_eq!(scheduler.load_more().await.unwrap(), 2);
        assert_eq!(scheduler.load_more().await.unwrap(), 0);

        let status = scheduler.status();
        assert_eq!(status.total, 30);
        assert!(status.exhausted);
        assert!(!status.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_connects_window_in_slot_order() {
        let (scheduler, pool) = setup(20, 7, 7);
        scheduler.load_more().await.unwrap();

        let report = scheduler.start().await.unwrap();
        assert_eq!((report.start, report.end), (0, 7));
        assert_eq!(report.monitored, room_ids(0..7));
        assert!(report.failed.is_empty());

        let handles = pool.handles();
        assert_eq!(handles[3].room_id(), "room_3");
        assert_eq!(handles[3].display_target(), DisplayTarget::slot(3));
        assert_eq!(pool.stats().connected, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_and_prev_rotate_full_window() {
        let (scheduler, pool) = setup(20, 7, 7);
        scheduler.load_more().await.unwrap();
        scheduler.load_more().await.unwrap();
        scheduler.start().await.unwrap();

        let report = scheduler.next().await.unwrap();
        assert_eq!((report.start, report.end), (7, 14));
        assert_eq!(report.monitored, room_ids(7..14));
        assert_eq!(pool.handle_for_room("room_0"), None);
        assert!(pool.handle_for_room("room_7").is_some());
        assert_eq!(pool.handles()[0].display_target(), DisplayTarget::slot(7));

        let report = scheduler.next().await.unwrap();
        assert_eq!((report.start, report.end), (13, 20));

        let report = scheduler.prev().await.unwrap();
        assert_eq!((report.start, report.end), (6, 13));
        assert_eq!(pool.stats().connected, 7);
        assert_eq!(pool.assigned_rooms(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_shortfall_aborts_without_touching_handles() {
        let (scheduler, pool) = setup(20, 3, 7);
        scheduler.load_more().await.unwrap();

        let err = scheduler.start().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Capacity {
                required: 7,
                available: 3
            }
        ));
        assert!(pool.handles().iter().all(|h| h.state() == PlayerState::Idle));
        assert!(scheduler.status().monitored.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_list_uses_fewer_handles() {
        let (scheduler, pool) = setup(4, 7, 7);
        scheduler.load_more().await.unwrap();

        let report = scheduler.next().await.unwrap();
        assert_eq!((report.start, report.end), (0, 4));
        assert_eq!(pool.stats().connected, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disconnects_engaged_handles() {
        let (scheduler, pool) = setup(10, 7, 7);
        scheduler.load_more().await.unwrap();
        scheduler.start().await.unwrap();

        scheduler.stop().await;

        assert_eq!(pool.stats().connected, 0);
        assert_eq!(pool.assigned_rooms(), 0);
        assert!(scheduler.status().monitored.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_monitored_room_rebuilds_window() {
        let (scheduler, pool) = setup(10, 7, 7);
        scheduler.load_more().await.unwrap();
        scheduler.start().await.unwrap();

        let result = scheduler.destroy_room("room_2").await.unwrap();
        assert!(result.is_success());

        let status = scheduler.status();
        assert_eq!(status.total, 9);
        assert!(!status.monitored.contains(&"room_2".to_string()));
        assert!(status.monitored.contains(&"room_7".to_string()));
        assert_eq!(pool.handle_for_room("room_2"), None);

        let missing = scheduler.destroy_room("room_2").await.unwrap();
        assert!(!missing.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_more_after_destroy_skips_no_room() {
        let (scheduler, _pool) = setup(30, 7, 7);
        scheduler.load_more().await.unwrap();
        scheduler.destroy_room("room_2").await.unwrap();

        scheduler.load_more().await.unwrap();
        scheduler.load_more().await.unwrap();

        let ids: Vec<String> = scheduler
            .candidates()
            .await
            .into_iter()
            .map(|room| room.room_id)
            .collect();
        assert_eq!(scheduler.status().total, 29);
        assert!(ids.contains(&"room_14".to_string()));
        assert!(!ids.contains(&"room_2".to_string()));
        assert!(scheduler.status().exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_resets_candidates() {
        let (scheduler, pool) = setup(30, 7, 7);
        scheduler.load_more().await.unwrap();
        scheduler.load_more().await.unwrap();
        scheduler.start().await.unwrap();

        assert_eq!(scheduler.reload().await.unwrap(), 14);
        let status = scheduler.status();
        assert_eq!(status.total, 14);
        assert_eq!(status.start, 0);
        assert!(status.monitored.is_empty());
        assert_eq!(pool.stats().connected, 0);
    }
}
