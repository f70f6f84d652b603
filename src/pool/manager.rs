use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use rand::Rng;

use crate::config::Settings;
use crate::credential::CredentialProvider;
use crate::error::{AppError, Result};
use crate::metrics::PoolMetrics;
use crate::player::{
    ConnectionHandle, DisplayTarget, HandleId, PlayerConfig, PlayerEventKind, PlayerFactory,
    RetryPolicy, RoomConfig,
};

use super::stats::{BatchReport, LifecycleCounters, LifecycleSnapshot, PoolStats};

/// Upper bound (inclusive) of generated subject ids
const SUBJECT_ID_MAX: u32 = 10_000_000;

/// Pool construction options
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub default_type: String,
    pub retry: RetryPolicy,
    /// Pause between leaving one room and entering another
    pub settle_delay: Duration,
}

impl PoolOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_type: settings.player.default_type.clone(),
            retry: RetryPolicy {
                auto_retry: settings.player.auto_retry,
                max_retry_count: settings.player.max_retry_count,
                retry_delay_base_ms: settings.player.retry_delay_ms,
            },
            settle_delay: Duration::from_millis(settings.monitor.settle_delay_ms),
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Owns the handles and the room <-> handle assignment
pub struct ConnectionPool {
    /// handle_id -> handle
    players: DashMap<HandleId, Arc<ConnectionHandle>>,
    /// Creation order of `players`
    order: RwLock<Vec<HandleId>>,
    /// room_id -> handle_id, kept in sync by handle event subscriptions
    room_index: Arc<DashMap<String, HandleId>>,
    factory: Arc<PlayerFactory>,
    credentials: Arc<dyn CredentialProvider>,
    default_type: RwLock<String>,
    retry: RetryPolicy,
    settle_delay: Duration,
    lifecycle: Arc<LifecycleCounters>,
}

impl ConnectionPool {
    pub fn new(
        factory: Arc<PlayerFactory>,
        credentials: Arc<dyn CredentialProvider>,
        options: PoolOptions,
    ) -> Self {
        Self {
            players: DashMap::new(),
            order: RwLock::new(Vec::new()),
            room_index: Arc::new(DashMap::new()),
            factory,
            credentials,
            default_type: RwLock::new(options.default_type),
            retry: options.retry,
            settle_delay: options.settle_delay,
            lifecycle: Arc::new(LifecycleCounters::default()),
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create one handle. Must be called from within a Tokio runtime.
    #[tracing::instrument(skip(self, config), fields(player_type = %config.player_type))]
    pub fn create_handle(&self, config: PlayerConfig) -> Result<HandleId> {
        config.validate()?;
        let transport = self.factory.create(&config)?;
        let handle = ConnectionHandle::new(config, transport)?;

        self.attach(&handle);

        let id = handle.id().clone();
        self.players.insert(id.clone(), handle);
        self.order
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(id.clone());

        tracing::info!(handle_id = %id, "Handle created");
        Ok(id)
    }

    /// Create handles from explicit configurations. Failures are logged and
    /// skipped; only the ids that were created are returned.
    pub fn create_handles_with(&self, configs: Vec<PlayerConfig>) -> Vec<HandleId> {
        let requested = configs.len();
        let ids: Vec<HandleId> = configs
            .into_iter()
            .filter_map(|config| match self.create_handle(config) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping handle that could not be created");
                    None
                }
            })
            .collect();

        tracing::info!(requested, created = ids.len(), "Batch handle creation completed");
        ids
    }

    /// Create `count` handles of `player_type` (the pool default when `None`),
    /// each with a generated subject id and an issued credential. Subjects
    /// without a credential are skipped.
    pub fn create_handles(&self, count: usize, player_type: Option<&str>) -> Vec<HandleId> {
        let player_type = player_type
            .map(str::to_string)
            .unwrap_or_else(|| self.default_type());

        let configs: Vec<PlayerConfig> = {
            let mut rng = rand::rng();
            (0..count)
                .filter_map(|index| {
                    let subject_id = format!("live_{}", rng.random_range(1..=SUBJECT_ID_MAX));
                    let Some(credential) = self.credentials.issue(&subject_id) else {
                        tracing::warn!(
                            subject_id = %subject_id,
                            index,
                            "No credential issued, skipping handle"
                        );
                        return None;
                    };

                    Some(
                        PlayerConfig::new(
                            player_type.clone(),
                            credential.subject_id,
                            DisplayTarget::slot(index),
                        )
                        .with_credential(credential.signature)
                        .with_retry(self.retry),
                    )
                })
                .collect()
        };

        self.create_handles_with(configs)
    }

    /// Subscribe the pool's bookkeeping to a new handle
    fn attach(&self, handle: &ConnectionHandle) {
        let index = self.room_index.clone();
        handle.subscribe(PlayerEventKind::Connected, move |event| {
            if !event.room_id.is_empty() {
                index.insert(event.room_id.clone(), event.handle_id.clone());
            }
        });

        let index = self.room_index.clone();
        handle.subscribe(PlayerEventKind::Disconnected, move |event| {
            index.retain(|_, bound| *bound != event.handle_id);
        });

        for kind in [
            PlayerEventKind::Connected,
            PlayerEventKind::Disconnected,
            PlayerEventKind::Playing,
            PlayerEventKind::Stopped,
            PlayerEventKind::Error,
            PlayerEventKind::Retry,
        ] {
            let lifecycle = self.lifecycle.clone();
            handle.subscribe(kind, move |event| lifecycle.record(event.kind));
        }
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn get(&self, id: &HandleId) -> Option<Arc<ConnectionHandle>> {
        self.players.get(id).map(|entry| entry.value().clone())
    }

    fn require(&self, id: &HandleId) -> Result<Arc<ConnectionHandle>> {
        self.get(id)
            .ok_or_else(|| AppError::NotFound(format!("player not found: {}", id)))
    }

    pub fn handle_for_room(&self, room_id: &str) -> Option<HandleId> {
        self.room_index.get(room_id).map(|entry| entry.value().clone())
    }

    /// Handles in creation order
    pub fn handles(&self) -> Vec<Arc<ConnectionHandle>> {
        self.handle_ids()
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn handle_ids(&self) -> Vec<HandleId> {
        self.order.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn handles_by_type(&self, player_type: &str) -> Vec<Arc<ConnectionHandle>> {
        self.handles()
            .into_iter()
            .filter(|handle| handle.player_type() == player_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn default_type(&self) -> String {
        self.default_type
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_default_type(&self, player_type: &str) -> Result<()> {
        if !self.factory.is_supported(player_type) {
            return Err(AppError::Validation(format!(
                "unsupported player type: {}",
                player_type
            )));
        }
        *self.default_type.write().unwrap_or_else(|e| e.into_inner()) = player_type.to_string();
        tracing::info!(player_type = %player_type, "Default player type changed");
        Ok(())
    }

    pub fn factory(&self) -> &Arc<PlayerFactory> {
        &self.factory
    }

    // ------------------------------------------------------------------
    // Room assignment
    // ------------------------------------------------------------------

    /// Connect handle `id` to `room`, leaving (and settling after) any other
    /// room the handle is in
    #[tracing::instrument(skip(self, id, room), fields(handle_id = %id, room_id = %room.room_id))]
    pub async fn connect_to_room(&self, id: &HandleId, room: RoomConfig) -> Result<()> {
        let handle = self.require(id)?;
        room.validate()?;

        if let Some(owner) = self.room_owner(&room.room_id, id) {
            return Err(already_assigned(&room.room_id, &owner));
        }

        let current = handle.room_id();
        if handle.is_connected() && current != room.room_id {
            handle.disconnect().await?;
            self.room_index.remove_if(&current, |_, bound| bound == id);
            tokio::time::sleep(self.settle_delay).await;
        }

        // The settle delay may have let another connect claim the room
        let room_id = room.room_id.clone();
        self.reserve_room(&room_id, id)?;

        if let Err(e) = handle.connect(room).await {
            self.room_index.remove_if(&room_id, |_, bound| bound == id);
            return Err(e);
        }

        self.room_index.insert(room_id, id.clone());
        tracing::info!("Handle connected to room");
        Ok(())
    }

    /// Handle other than `id` that holds or is entering `room_id`
    fn room_owner(&self, room_id: &str, id: &HandleId) -> Option<HandleId> {
        let owner = self.handle_for_room(room_id)?;
        self.holds_room(&owner, room_id, id).then_some(owner)
    }

    fn holds_room(&self, owner: &HandleId, room_id: &str, id: &HandleId) -> bool {
        owner != id
            && self
                .get(owner)
                .is_some_and(|h| !h.is_destroyed() && h.room_id() == room_id)
    }

    /// Atomically claim `room_id` for `id` in the room index
    fn reserve_room(&self, room_id: &str, id: &HandleId) -> Result<()> {
        match self.room_index.entry(room_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let owner = entry.get().clone();
                if self.holds_room(&owner, room_id, id) {
                    return Err(already_assigned(room_id, &owner));
                }
                entry.insert(id.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(id.clone());
            }
        }
        Ok(())
    }

    /// Connect all pairs concurrently. Individual failures are logged and
    /// reported; the call itself never fails.
    pub async fn connect_to_rooms(&self, batch: Vec<(HandleId, RoomConfig)>) -> BatchReport {
        let count = batch.len();
        let mut report = BatchReport::default();

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(batch.len());
        for (id, room) in batch {
            if seen.insert(room.room_id.clone()) {
                unique.push((id, room));
            } else {
                tracing::warn!(handle_id = %id, room_id = %room.room_id, "Room appears twice in batch");
                report.failed.push(room.room_id);
            }
        }

        let results = join_all(unique.into_iter().map(|(id, room)| async move {
            let room_id = room.room_id.clone();
            let result = self.connect_to_room(&id, room).await;
            (id, room_id, result)
        }))
        .await;

        for (id, room_id, result) in results {
            match result {
                Ok(()) => report.succeeded.push(room_id),
                Err(e) => {
                    tracing::warn!(
                        handle_id = %id,
                        room_id = %room_id,
                        error = %e,
                        "Batch connect failed for handle"
                    );
                    report.failed.push(room_id);
                }
            }
        }

        tracing::info!(
            count,
            succeeded = report.success_count(),
            "Batch room connections completed"
        );
        report
    }

    /// Disconnect handle `id`. Its room assignment is dropped whatever the
    /// transport outcome.
    #[tracing::instrument(skip(self, id), fields(handle_id = %id))]
    pub async fn disconnect_from_room(&self, id: &HandleId) -> Result<()> {
        let handle = self.require(id)?;
        let room_id = handle.room_id();

        let result = handle.disconnect().await;

        if !room_id.is_empty() {
            self.room_index.remove_if(&room_id, |_, bound| bound == id);
        }

        match &result {
            Ok(()) => tracing::info!(room_id = %room_id, "Handle disconnected from room"),
            Err(e) => tracing::warn!(room_id = %room_id, error = %e, "Disconnect failed"),
        }
        result
    }

    pub async fn disconnect_from_rooms(&self, ids: &[HandleId]) -> BatchReport {
        let results = join_all(ids.iter().map(|id| async move {
            (id, self.disconnect_from_room(id).await)
        }))
        .await;

        let mut report = BatchReport::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.succeeded.push(id.to_string()),
                Err(e) => {
                    tracing::warn!(handle_id = %id, error = %e, "Batch disconnect failed for handle");
                    report.failed.push(id.to_string());
                }
            }
        }

        tracing::info!(count = ids.len(), "Batch room disconnections completed");
        report
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    pub async fn start_play(&self, id: &HandleId) -> Result<()> {
        self.require(id)?.play().await
    }

    pub async fn stop_play(&self, id: &HandleId) -> Result<()> {
        self.require(id)?.stop().await
    }

    pub async fn update_target(&self, id: &HandleId, target: DisplayTarget) -> Result<()> {
        self.require(id)?.update_target(target).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    #[tracing::instrument(skip(self, id), fields(handle_id = %id))]
    pub async fn destroy_handle(&self, id: &HandleId) -> Result<()> {
        let handle = self.require(id)?;
        handle.destroy().await;
        self.forget(id);

        tracing::info!("Handle destroyed");
        Ok(())
    }

    /// Destroy every handle and clear the pool. Idempotent.
    ///
    /// A handle leaves the pool only once its own teardown has finished, so a
    /// call cut short by a timeout leaves the rest reachable.
    pub async fn destroy_all_handles(&self) -> usize {
        let handles = self.handles();

        join_all(handles.iter().map(|handle| async move {
            handle.destroy().await;
            self.forget(handle.id());
        }))
        .await;

        if !handles.is_empty() {
            tracing::info!(count = handles.len(), "All handles destroyed");
        }
        handles.len()
    }

    fn forget(&self, id: &HandleId) {
        self.players.remove(id);
        self.order
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|existing| existing != id);
        self.room_index.retain(|_, bound| *bound != *id);
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn stats(&self) -> PoolStats {
        let snapshots: Vec<_> = self.handles().iter().map(|h| h.snapshot()).collect();
        let stats = PoolStats::from_snapshots(&snapshots);
        PoolMetrics::observe(&stats, self.room_index.len());
        stats
    }

    pub fn stats_by_type(&self, player_type: &str) -> PoolStats {
        let snapshots: Vec<_> = self
            .handles_by_type(player_type)
            .iter()
            .map(|h| h.snapshot())
            .collect();
        PoolStats::from_snapshots(&snapshots)
    }

    pub fn lifecycle(&self) -> LifecycleSnapshot {
        self.lifecycle.snapshot()
    }

    /// Number of rooms currently assigned to a handle
    pub fn assigned_rooms(&self) -> usize {
        self.room_index.len()
    }
}

fn already_assigned(room_id: &str, owner: &HandleId) -> AppError {
    AppError::Validation(format!("room {} is already assigned to {}", room_id, owner))
}
