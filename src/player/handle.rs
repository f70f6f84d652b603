//! Connection handle: one playback connection and its lifecycle state machine
//!
//! Every public operation takes the handle's execution lock, so operations on
//! one handle run strictly one after another (including background retries and
//! transport event handling). Operations on different handles never contend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::metrics::HandleMetrics;
use crate::tasks::OneShotTimer;
use crate::transport::{EnterRequest, Transport, TransportEvent};

use super::events::{EventChannel, PlayerEventData, PlayerEventKind, SubscriptionId};
use super::types::{
    DisplayTarget, HandleId, PlayerConfig, PlayerInfo, PlayerSnapshot, PlayerState, RoomConfig,
};

/// Operation a failure happened in; only `Connect` and `Play` are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureContext {
    Connect,
    Disconnect,
    Play,
    Stop,
    Transport,
}

impl FailureContext {
    fn as_str(&self) -> &'static str {
        match self {
            FailureContext::Connect => "connect",
            FailureContext::Disconnect => "disconnect",
            FailureContext::Play => "play",
            FailureContext::Stop => "stop",
            FailureContext::Transport => "transport",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, FailureContext::Connect | FailureContext::Play)
    }
}

#[derive(Debug)]
struct HandleState {
    state: PlayerState,
    room_id: String,
    room: Option<RoomConfig>,
    is_connected: bool,
    is_playing: bool,
    retry_count: u32,
    last_error: Option<String>,
    metadata: HashMap<String, Value>,
    /// Remote video stream announced by the transport
    stream_ref: Option<String>,
}

impl HandleState {
    fn new() -> Self {
        Self {
            state: PlayerState::Idle,
            room_id: String::new(),
            room: None,
            is_connected: false,
            is_playing: false,
            retry_count: 0,
            last_error: None,
            metadata: HashMap::new(),
            stream_ref: None,
        }
    }

    fn reset_connection(&mut self) {
        self.state = PlayerState::Idle;
        self.is_connected = false;
        self.is_playing = false;
        self.room_id.clear();
        self.room = None;
        self.retry_count = 0;
        self.stream_ref = None;
    }
}

pub struct ConnectionHandle {
    id: HandleId,
    player_type: String,
    config: RwLock<PlayerConfig>,
    state: RwLock<HandleState>,
    transport: Arc<dyn Transport>,
    events: EventChannel,
    /// Serializes every operation on this handle
    op_lock: tokio::sync::Mutex<()>,
    retry: Mutex<Option<OneShotTimer>>,
    /// Exits we requested whose `ExitResult` has not been seen yet
    pending_exits: AtomicU32,
    pump: Mutex<Option<JoinHandle<()>>>,
    created_at: DateTime<Utc>,
    weak_self: Weak<ConnectionHandle>,
}

impl ConnectionHandle {
    /// Create a handle driving `transport`.
    ///
    /// Must be called from within a Tokio runtime; the transport's event
    /// source is consumed by a background task for the handle's lifetime.
    pub fn new(config: PlayerConfig, transport: Arc<dyn Transport>) -> Result<Arc<Self>> {
        config.validate()?;

        let events_rx = transport.events();
        let id = HandleId::generate(&config.player_type);

        let handle = Arc::new_cyclic(|weak_self| Self {
            id,
            player_type: config.player_type.clone(),
            config: RwLock::new(config),
            state: RwLock::new(HandleState::new()),
            transport,
            events: EventChannel::new(),
            op_lock: tokio::sync::Mutex::new(()),
            retry: Mutex::new(None),
            pending_exits: AtomicU32::new(0),
            pump: Mutex::new(None),
            created_at: Utc::now(),
            weak_self: weak_self.clone(),
        });

        let pump = tokio::spawn(pump_transport_events(Arc::downgrade(&handle), events_rx));
        *lock(&handle.pump) = Some(pump);

        tracing::debug!(handle_id = %handle.id, player_type = %handle.player_type, "Handle created");
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> &HandleId {
        &self.id
    }

    pub fn player_type(&self) -> &str {
        &self.player_type
    }

    pub fn state(&self) -> PlayerState {
        self.read_state().state
    }

    pub fn room_id(&self) -> String {
        self.read_state().room_id.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.read_state().is_connected
    }

    pub fn is_playing(&self) -> bool {
        self.read_state().is_playing
    }

    pub fn is_destroyed(&self) -> bool {
        self.read_state().state == PlayerState::Destroyed
    }

    pub fn retry_count(&self) -> u32 {
        self.read_state().retry_count
    }

    pub fn last_error(&self) -> Option<String> {
        self.read_state().last_error.clone()
    }

    pub fn display_target(&self) -> DisplayTarget {
        self.read_config().display_target.clone()
    }

    /// True while a backoff timer is armed and has not fired yet
    pub fn retry_pending(&self) -> bool {
        lock(&self.retry)
            .as_ref()
            .is_some_and(|timer| !timer.is_cancelled() && !timer.is_finished())
    }

    pub fn info(&self) -> PlayerInfo {
        let config = self.read_config();
        PlayerInfo {
            id: self.id.clone(),
            player_type: self.player_type.clone(),
            subject_id: config.subject_id.clone(),
            display_target: config.display_target.clone(),
        }
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let (subject_id, display_target) = {
            let config = self.read_config();
            (config.subject_id.clone(), config.display_target.clone())
        };
        let retry_pending = self.retry_pending();
        let state = self.read_state();

        PlayerSnapshot {
            id: self.id.clone(),
            player_type: self.player_type.clone(),
            state: state.state,
            room_id: state.room_id.clone(),
            is_connected: state.is_connected,
            is_playing: state.is_playing,
            retry_count: state.retry_count,
            retry_pending,
            last_error: state.last_error.clone(),
            metadata: state.metadata.clone(),
            subject_id,
            display_target,
            created_at: self.created_at,
        }
    }

    pub fn subscribe<F>(&self, kind: PlayerEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&PlayerEventData) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, callback)
    }

    pub fn unsubscribe(&self, kind: PlayerEventKind, id: SubscriptionId) -> bool {
        self.events.unsubscribe(kind, id)
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Enter `room`. No-op when already connected to it; leaves any other
    /// room first.
    pub async fn connect(&self, room: RoomConfig) -> Result<()> {
        self.cancel_retry();
        let _guard = self.op_lock.lock().await;
        self.connect_locked(room).await
    }

    /// Leave the current room. No-op when not connected.
    pub async fn disconnect(&self) -> Result<()> {
        self.cancel_retry();
        let _guard = self.op_lock.lock().await;
        self.disconnect_locked().await
    }

    pub async fn play(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.play_locked().await
    }

    pub async fn stop(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        self.stop_locked().await
    }

    pub async fn pause(&self) {
        let _guard = self.op_lock.lock().await;
        self.update(|s| {
            if s.state == PlayerState::Playing {
                s.state = PlayerState::Paused;
            }
        });
    }

    pub async fn resume(&self) {
        let _guard = self.op_lock.lock().await;
        self.update(|s| {
            if s.state == PlayerState::Paused {
                s.state = PlayerState::Playing;
            }
        });
    }

    /// Point the handle at a new display target, rebinding live video
    pub async fn update_target(&self, target: DisplayTarget) {
        let _guard = self.op_lock.lock().await;

        let previous = {
            let mut config = self.write_config();
            std::mem::replace(&mut config.display_target, target.clone())
        };

        let stream = {
            let state = self.read_state();
            if state.is_playing {
                state.stream_ref.clone()
            } else {
                None
            }
        };

        if let Some(stream) = stream {
            let rebind = async {
                self.transport.unbind_display(&stream).await?;
                self.transport.bind_display(&stream, &target).await
            };
            if let Err(e) = rebind.await {
                tracing::warn!(
                    handle_id = %self.id,
                    target = %target,
                    error = %e,
                    "Failed to rebind video to new target"
                );
            }
        }

        tracing::debug!(handle_id = %self.id, from = %previous, to = %target, "Display target updated");
    }

    /// Tear the handle down for good. Idempotent and best-effort: failures
    /// are logged and the handle still ends `Destroyed`.
    pub async fn destroy(&self) {
        self.cancel_retry();
        let _guard = self.op_lock.lock().await;

        if self.is_destroyed() {
            return;
        }

        if self.is_connected() {
            if let Err(e) = self.disconnect_locked().await {
                tracing::warn!(handle_id = %self.id, error = %e, "Disconnect during destroy failed");
            }
        }

        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
        self.transport.release().await;

        self.update(|s| {
            s.reset_connection();
            s.state = PlayerState::Destroyed;
        });
        self.events.clear();

        tracing::info!(handle_id = %self.id, "Handle destroyed");
    }

    // ------------------------------------------------------------------
    // Operations with the execution lock held
    // ------------------------------------------------------------------

    async fn connect_locked(&self, room: RoomConfig) -> Result<()> {
        if self.is_destroyed() {
            return Err(AppError::Connection("player has been destroyed".to_string()));
        }
        room.validate()?;

        let (connected, current_room) = {
            let s = self.read_state();
            (s.is_connected, s.room_id.clone())
        };

        if connected && current_room == room.room_id {
            tracing::debug!(handle_id = %self.id, room_id = %room.room_id, "Already connected to room");
            return Ok(());
        }

        if connected {
            if let Err(e) = self.disconnect_locked().await {
                return Err(self.fail(FailureContext::Connect, e));
            }
        }

        let room_id = room.room_id.clone();
        let request = {
            let config = self.read_config();
            EnterRequest::new(&room, &config.subject_id, config.credential.as_deref())
        };

        self.update(|s| {
            s.state = PlayerState::Connecting;
            s.room_id = room_id.clone();
            s.room = Some(room);
        });

        match self.transport.enter(&request).await {
            Ok(code) if code > 0 => {
                self.update(|s| {
                    s.state = PlayerState::Connected;
                    s.is_connected = true;
                    s.retry_count = 0;
                });
                self.emit(PlayerEventKind::Connected, None);
                tracing::info!(handle_id = %self.id, room_id = %room_id, "Connected to room");
                Ok(())
            }
            Ok(code) => Err(self.fail(
                FailureContext::Connect,
                AppError::Connection(format!("failed to enter room, result: {}", code)),
            )),
            Err(e) => Err(self.fail(FailureContext::Connect, e.into())),
        }
    }

    async fn disconnect_locked(&self) -> Result<()> {
        let (connected, playing) = {
            let s = self.read_state();
            (s.is_connected, s.is_playing)
        };
        if !connected {
            return Ok(());
        }

        if playing {
            self.stop_locked().await?;
        }

        self.pending_exits.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.transport.exit().await {
            self.pending_exits.fetch_sub(1, Ordering::SeqCst);
            return Err(self.fail(FailureContext::Disconnect, e.into()));
        }

        let room_id = self.room_id();
        self.update(HandleState::reset_connection);
        self.emit(PlayerEventKind::Disconnected, None);
        tracing::info!(handle_id = %self.id, room_id = %room_id, "Disconnected from room");
        Ok(())
    }

    async fn play_locked(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(AppError::Connection("player has been destroyed".to_string()));
        }

        let (connected, playing, stream) = {
            let s = self.read_state();
            (s.is_connected, s.is_playing, s.stream_ref.clone())
        };
        if !connected {
            return Err(AppError::Connection("not connected to any room".to_string()));
        }
        if playing {
            tracing::debug!(handle_id = %self.id, "Already playing");
            return Ok(());
        }

        let Some(stream) = stream else {
            return Err(self.fail(
                FailureContext::Play,
                AppError::Connection("no stream available to play".to_string()),
            ));
        };
        let target = self.display_target();

        // A stale binding of the same stream may still exist
        let _ = self.transport.unbind_display(&stream).await;

        if let Err(e) = self.transport.bind_display(&stream, &target).await {
            return Err(self.fail(FailureContext::Play, e.into()));
        }

        self.update(|s| {
            s.state = PlayerState::Playing;
            s.is_playing = true;
        });
        self.emit(PlayerEventKind::Playing, None);
        tracing::info!(handle_id = %self.id, stream = %stream, target = %target, "Playback started");
        Ok(())
    }

    async fn stop_locked(&self) -> Result<()> {
        let (playing, stream) = {
            let s = self.read_state();
            (s.is_playing, s.stream_ref.clone())
        };
        if !playing {
            return Ok(());
        }

        if let Some(stream) = stream {
            if let Err(e) = self.transport.unbind_display(&stream).await {
                return Err(self.fail(FailureContext::Stop, e.into()));
            }
        }

        self.update(|s| {
            s.state = if s.is_connected {
                PlayerState::Connected
            } else {
                PlayerState::Idle
            };
            s.is_playing = false;
        });
        self.emit(PlayerEventKind::Stopped, None);
        tracing::debug!(handle_id = %self.id, "Playback stopped");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Failure handling and retry
    // ------------------------------------------------------------------

    /// Record `err`, emit `Error` and arm a retry when the context allows it.
    /// Returns `err` so callers can propagate it.
    fn fail(&self, context: FailureContext, err: AppError) -> AppError {
        let message = err.to_string();
        tracing::warn!(
            handle_id = %self.id,
            context = context.as_str(),
            error = %message,
            "Handle operation failed"
        );

        self.update(|s| {
            s.state = PlayerState::Error;
            s.last_error = Some(message.clone());
        });
        self.emit(PlayerEventKind::Error, Some(message));

        let retry = self.read_config().retry;
        let retry_count = self.retry_count();
        if context.is_retryable() && retry.allows(retry_count) && !self.is_destroyed() {
            self.schedule_retry(context, retry.delay_for(retry_count));
        }

        err
    }

    fn schedule_retry(&self, context: FailureContext, delay: std::time::Duration) {
        let weak = self.weak_self.clone();
        let timer = OneShotTimer::schedule(delay, move |token| async move {
            if let Some(handle) = weak.upgrade() {
                handle.run_retry(context, token).await;
            }
        });

        tracing::debug!(
            handle_id = %self.id,
            context = context.as_str(),
            delay_ms = delay.as_millis() as u64,
            "Retry scheduled"
        );

        // Replacing drops (and cancels) any previous timer
        *lock(&self.retry) = Some(timer);
    }

    async fn run_retry(&self, context: FailureContext, token: CancellationToken) {
        let _guard = self.op_lock.lock().await;

        if token.is_cancelled() || self.is_destroyed() {
            tracing::debug!(handle_id = %self.id, "Stale retry dropped");
            return;
        }

        let retry_count = {
            let mut s = self.write_state();
            s.retry_count += 1;
            s.retry_count
        };
        HandleMetrics::retry();
        self.emit(PlayerEventKind::Retry, None);
        tracing::info!(
            handle_id = %self.id,
            context = context.as_str(),
            retry_count,
            "Retrying operation"
        );

        let result = match context {
            FailureContext::Connect => {
                let room = self.read_state().room.clone();
                match room {
                    Some(room) => self.connect_locked(room).await,
                    None => return,
                }
            }
            FailureContext::Play => self.play_locked().await,
            _ => return,
        };

        if let Err(e) = result {
            tracing::debug!(handle_id = %self.id, retry_count, error = %e, "Retry failed");
        }
    }

    fn cancel_retry(&self) {
        if let Some(timer) = lock(&self.retry).take() {
            timer.cancel();
        }
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    async fn on_transport_event(&self, event: TransportEvent) {
        let _guard = self.op_lock.lock().await;

        if self.is_destroyed() {
            return;
        }

        match event {
            TransportEvent::VideoAvailable {
                room_id,
                stream_ref,
                available: true,
            } => {
                if !self.is_current_room(&room_id) {
                    tracing::debug!(handle_id = %self.id, room_id = %room_id, "Stale video event dropped");
                    return;
                }

                let should_play = {
                    let mut s = self.write_state();
                    s.stream_ref = Some(stream_ref.clone());
                    s.metadata.insert("has_remote_video".into(), Value::Bool(true));
                    s.metadata.insert("stream_url".into(), Value::String(stream_ref));
                    s.is_connected && !s.is_playing
                };

                if should_play {
                    if let Err(e) = self.play_locked().await {
                        tracing::debug!(handle_id = %self.id, error = %e, "Auto play failed");
                    }
                }
            }
            TransportEvent::VideoAvailable {
                room_id,
                stream_ref,
                available: false,
            } => {
                let was_playing = {
                    let mut s = self.write_state();
                    if s.room_id != room_id || s.stream_ref.as_deref() != Some(stream_ref.as_str()) {
                        tracing::debug!(handle_id = %self.id, room_id = %room_id, "Stale video event dropped");
                        return;
                    }
                    s.stream_ref = None;
                    s.metadata.insert("has_remote_video".into(), Value::Bool(false));
                    s.metadata.insert("stream_url".into(), Value::String(String::new()));
                    s.is_playing
                };

                if was_playing {
                    self.update(|s| {
                        s.state = PlayerState::Connected;
                        s.is_playing = false;
                    });
                    self.emit(PlayerEventKind::Stopped, None);
                }
            }
            TransportEvent::AudioAvailable {
                room_id, available, ..
            } => {
                if self.is_current_room(&room_id) {
                    self.write_state()
                        .metadata
                        .insert("has_remote_audio".into(), Value::Bool(available));
                }
            }
            TransportEvent::EnterResult { code } => {
                tracing::debug!(handle_id = %self.id, code, "Enter acknowledged");
            }
            TransportEvent::ExitResult { reason } => {
                let requested = self
                    .pending_exits
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();

                if requested {
                    tracing::debug!(handle_id = %self.id, reason, "Exit acknowledged");
                } else if self.is_connected() {
                    tracing::warn!(
                        handle_id = %self.id,
                        room_id = %self.room_id(),
                        reason,
                        "Removed from room by remote"
                    );
                    self.update(HandleState::reset_connection);
                    self.emit(PlayerEventKind::Disconnected, None);
                }
            }
            TransportEvent::Error { code, message } => {
                self.fail(
                    FailureContext::Transport,
                    AppError::Connection(format!("transport error {}: {}", code, message)),
                );
            }
            TransportEvent::ConnectionStateChanged { state } => {
                tracing::debug!(handle_id = %self.id, transport_state = %state, "Transport state changed");
                self.write_state()
                    .metadata
                    .insert("transport_state".into(), Value::String(state));
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Apply a state mutation; emits `StateChanged` when the state moved.
    /// `Destroyed` is terminal: mutations after it are ignored.
    fn update(&self, apply: impl FnOnce(&mut HandleState)) {
        let (from, to) = {
            let mut s = self.write_state();
            if s.state.is_terminal() {
                return;
            }
            let from = s.state;
            apply(&mut *s);
            if !s.is_connected {
                s.is_playing = false;
            }
            (from, s.state)
        };

        if from != to {
            tracing::debug!(handle_id = %self.id, from = %from, to = %to, "State changed");
            self.emit(PlayerEventKind::StateChanged, None);
        }
    }

    /// Whether `room_id` is the room the handle is connected to right now
    fn is_current_room(&self, room_id: &str) -> bool {
        let s = self.read_state();
        s.is_connected && s.room_id == room_id
    }

    fn emit(&self, kind: PlayerEventKind, error: Option<String>) {
        let data = {
            let s = self.read_state();
            PlayerEventData {
                kind,
                handle_id: self.id.clone(),
                room_id: s.room_id.clone(),
                state: s.state,
                error,
                retry_count: s.retry_count,
            }
        };

        if kind != PlayerEventKind::StateChanged {
            HandleMetrics::event(kind.as_str());
        }
        self.events.emit(data);
    }

    fn read_state(&self) -> RwLockReadGuard<'_, HandleState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, HandleState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_config(&self) -> RwLockReadGuard<'_, PlayerConfig> {
        self.config.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_config(&self) -> RwLockWriteGuard<'_, PlayerConfig> {
        self.config.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("player_type", &self.player_type)
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Feed transport events into the handle until either side goes away
async fn pump_transport_events(
    handle: Weak<ConnectionHandle>,
    mut events: broadcast::Receiver<TransportEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Transport events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(handle) = handle.upgrade() else {
            break;
        };
        handle.on_transport_event(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::RetryPolicy;
    use crate::transport::{LoopbackBehavior, LoopbackTransport, TransportError};
    use std::time::Duration;

    fn handle_with(behavior: LoopbackBehavior, retry: RetryPolicy) -> (Arc<ConnectionHandle>, Arc<LoopbackTransport>) {
        let transport = Arc::new(LoopbackTransport::new(behavior));
        let config = PlayerConfig::new("loopback", "live_42", DisplayTarget::slot(0)).with_retry(retry);
        let handle = ConnectionHandle::new(config, transport.clone()).unwrap();
        (handle, transport)
    }

    fn no_retry() -> RetryPolicy {
        RetryPolicy {
            auto_retry: false,
            ..RetryPolicy::default()
        }
    }

    fn record(handle: &ConnectionHandle, kind: PlayerEventKind) -> Arc<Mutex<Vec<PlayerEventData>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        handle.subscribe(kind, move |data| sink.lock().unwrap().push(data.clone()));
        seen
    }

    /// Let the event pump drain what the loopback published
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_connect_same_room_is_idempotent() {
        let (handle, transport) = handle_with(LoopbackBehavior::silent(), no_retry());

        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        handle.connect(RoomConfig::new("room-1")).await.unwrap();

        assert_eq!(transport.calls().enter, 1);
        assert_eq!(handle.state(), PlayerState::Connected);
        assert_eq!(handle.room_id(), "room-1");
    }

    #[tokio::test]
    async fn test_connect_other_room_disconnects_first() {
        let (handle, transport) = handle_with(LoopbackBehavior::silent(), no_retry());

        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        handle.connect(RoomConfig::new("room-2")).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.enter, 2);
        assert_eq!(calls.exit, 1);
        assert_eq!(transport.current_room().as_deref(), Some("room-2"));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let (handle, transport) = handle_with(LoopbackBehavior::silent(), no_retry());
        let events = record(&handle, PlayerEventKind::StateChanged);

        handle.disconnect().await.unwrap();

        assert_eq!(transport.calls(), Default::default());
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_video_available_auto_plays() {
        let (handle, transport) = handle_with(LoopbackBehavior::default(), no_retry());
        let playing = record(&handle, PlayerEventKind::Playing);

        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        settle().await;

        assert_eq!(handle.state(), PlayerState::Playing);
        assert!(handle.is_playing());
        assert_eq!(playing.lock().unwrap().len(), 1);
        assert_eq!(
            transport.binding(),
            Some(("loopback_room-1".to_string(), DisplayTarget::slot(0)))
        );

        handle.disconnect().await.unwrap();
        settle().await;
        assert_eq!(handle.state(), PlayerState::Idle);
        assert!(!handle.is_playing());
        assert!(transport.binding().is_none());
    }

    #[tokio::test]
    async fn test_play_requires_connection() {
        let (handle, _transport) = handle_with(LoopbackBehavior::silent(), no_retry());
        let err = handle.play().await.unwrap_err();
        assert!(err.to_string().contains("not connected"));
        assert_eq!(handle.state(), PlayerState::Idle);
    }

    #[tokio::test]
    async fn test_play_without_stream_fails_and_records() {
        let (handle, _transport) = handle_with(LoopbackBehavior::silent(), no_retry());
        handle.connect(RoomConfig::new("room-1")).await.unwrap();

        let err = handle.play().await.unwrap_err();
        assert!(err.to_string().contains("no stream available"));
        assert_eq!(handle.state(), PlayerState::Error);
        assert!(handle.last_error().is_some());
        assert!(handle.is_connected());
    }

    #[tokio::test]
    async fn test_pause_and_resume_are_overlays() {
        let (handle, transport) = handle_with(LoopbackBehavior::default(), no_retry());

        handle.pause().await;
        assert_eq!(handle.state(), PlayerState::Idle);

        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        settle().await;
        let binds = transport.calls().bind;

        handle.pause().await;
        assert_eq!(handle.state(), PlayerState::Paused);
        assert!(handle.is_playing());

        handle.resume().await;
        assert_eq!(handle.state(), PlayerState::Playing);
        assert_eq!(transport.calls().bind, binds);
    }

    #[tokio::test]
    async fn test_video_unavailable_stops_playback() {
        let (handle, transport) = handle_with(LoopbackBehavior::default(), no_retry());
        let stopped = record(&handle, PlayerEventKind::Stopped);

        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        settle().await;
        assert!(handle.is_playing());

        transport.inject(TransportEvent::VideoAvailable {
            room_id: "room-1".to_string(),
            stream_ref: "loopback_room-1".to_string(),
            available: false,
        });
        settle().await;

        assert_eq!(handle.state(), PlayerState::Connected);
        assert_eq!(stopped.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_switching_rooms_plays_only_the_new_stream() {
        let (handle, transport) = handle_with(LoopbackBehavior::default(), no_retry());

        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        handle.connect(RoomConfig::new("room-2")).await.unwrap();
        settle().await;

        assert_eq!(handle.room_id(), "room-2");
        assert_eq!(handle.state(), PlayerState::Playing);
        assert_eq!(
            transport.binding(),
            Some(("loopback_room-2".to_string(), DisplayTarget::slot(0)))
        );
    }

    #[tokio::test]
    async fn test_unavailable_event_of_other_stream_is_ignored() {
        let (handle, transport) = handle_with(LoopbackBehavior::default(), no_retry());
        let stopped = record(&handle, PlayerEventKind::Stopped);

        handle.connect(RoomConfig::new("room-2")).await.unwrap();
        settle().await;

        transport.inject(TransportEvent::VideoAvailable {
            room_id: "room-1".to_string(),
            stream_ref: "loopback_room-1".to_string(),
            available: false,
        });
        transport.inject(TransportEvent::VideoAvailable {
            room_id: "room-2".to_string(),
            stream_ref: "loopback_other".to_string(),
            available: false,
        });
        settle().await;

        assert_eq!(handle.state(), PlayerState::Playing);
        assert!(stopped.lock().unwrap().is_empty());
        assert_eq!(
            transport.binding(),
            Some(("loopback_room-2".to_string(), DisplayTarget::slot(0)))
        );
    }

    #[tokio::test]
    async fn test_remote_exit_moves_to_idle() {
        let (handle, transport) = handle_with(LoopbackBehavior::silent(), no_retry());
        let disconnected = record(&handle, PlayerEventKind::Disconnected);

        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        transport.inject(TransportEvent::ExitResult { reason: 1 });
        settle().await;

        assert_eq!(handle.state(), PlayerState::Idle);
        assert!(handle.room_id().is_empty());
        assert_eq!(disconnected.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_own_exit_is_not_a_remote_kick() {
        let (handle, _transport) = handle_with(LoopbackBehavior::silent(), no_retry());
        let disconnected = record(&handle, PlayerEventKind::Disconnected);

        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        handle.disconnect().await.unwrap();
        handle.connect(RoomConfig::new("room-2")).await.unwrap();
        settle().await;

        // Only the explicit disconnect; the late ack must not drop room-2
        assert_eq!(disconnected.lock().unwrap().len(), 1);
        assert_eq!(handle.room_id(), "room-2");
        assert!(handle.is_connected());
    }

    #[tokio::test]
    async fn test_non_positive_enter_code_fails_connect() {
        let (handle, _transport) = handle_with(
            LoopbackBehavior {
                enter_code: -100,
                ..LoopbackBehavior::silent()
            },
            no_retry(),
        );

        let err = handle.connect(RoomConfig::new("room-1")).await.unwrap_err();
        assert!(matches!(err, AppError::Connection(_)));
        assert_eq!(handle.state(), PlayerState::Error);
        assert!(!handle.is_connected());
        assert!(!handle.retry_pending());
    }

    #[tokio::test]
    async fn test_empty_room_id_rejected() {
        let (handle, transport) = handle_with(LoopbackBehavior::silent(), no_retry());
        let err = handle.connect(RoomConfig::new("")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(transport.calls().enter, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_count_grows_to_max_then_stops() {
        let retry = RetryPolicy {
            auto_retry: true,
            max_retry_count: 3,
            retry_delay_base_ms: 100,
        };
        let (handle, transport) = handle_with(
            LoopbackBehavior {
                failing_enters: 100,
                ..LoopbackBehavior::silent()
            },
            retry,
        );
        let retries = record(&handle, PlayerEventKind::Retry);

        assert!(handle.connect(RoomConfig::new("room-1")).await.is_err());
        assert!(handle.retry_pending());

        // 100 + 200 + 300 ms of backoff, with slack
        tokio::time::sleep(Duration::from_millis(2_000)).await;
        settle().await;

        let counts: Vec<u32> = retries.lock().unwrap().iter().map(|e| e.retry_count).collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert_eq!(handle.retry_count(), 3);
        assert_eq!(transport.calls().enter, 4);
        assert!(!handle.retry_pending());
        assert_eq!(handle.state(), PlayerState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_and_resets_count() {
        let retry = RetryPolicy {
            auto_retry: true,
            max_retry_count: 3,
            retry_delay_base_ms: 100,
        };
        let (handle, transport) = handle_with(
            LoopbackBehavior {
                failing_enters: 1,
                ..LoopbackBehavior::silent()
            },
            retry,
        );
        let connected = record(&handle, PlayerEventKind::Connected);

        assert!(handle.connect(RoomConfig::new("room-1")).await.is_err());
        tokio::time::sleep(Duration::from_millis(500)).await;
        settle().await;

        assert_eq!(transport.calls().enter, 2);
        assert_eq!(handle.state(), PlayerState::Connected);
        assert_eq!(handle.retry_count(), 0);
        assert_eq!(connected.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_retry() {
        let (handle, transport) = handle_with(
            LoopbackBehavior {
                failing_enters: 1,
                ..LoopbackBehavior::silent()
            },
            RetryPolicy::default(),
        );

        assert!(handle.connect(RoomConfig::new("room-1")).await.is_err());
        assert!(handle.retry_pending());

        handle.disconnect().await.unwrap();
        assert!(!handle.retry_pending());

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.calls().enter, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_is_idempotent_and_final() {
        let (handle, transport) = handle_with(
            LoopbackBehavior {
                failing_enters: 1,
                ..LoopbackBehavior::silent()
            },
            RetryPolicy::default(),
        );
        let _ = handle.connect(RoomConfig::new("room-1")).await;

        handle.destroy().await;
        handle.destroy().await;

        assert_eq!(handle.state(), PlayerState::Destroyed);
        assert_eq!(transport.calls().release, 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.calls().enter, 1);

        let err = handle.connect(RoomConfig::new("room-1")).await.unwrap_err();
        assert!(err.to_string().contains("destroyed"));
        assert_eq!(handle.state(), PlayerState::Destroyed);
    }

    #[tokio::test]
    async fn test_destroy_survives_failing_exit() {
        let (handle, transport) = handle_with(LoopbackBehavior::silent(), no_retry());
        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        transport.set_behavior(LoopbackBehavior {
            fail_exit: true,
            ..LoopbackBehavior::silent()
        });

        handle.destroy().await;

        assert_eq!(handle.state(), PlayerState::Destroyed);
        assert!(!handle.is_connected());
        assert_eq!(handle.events.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_recorded_without_retry() {
        let (handle, transport) = handle_with(LoopbackBehavior::silent(), RetryPolicy::default());
        let errors = record(&handle, PlayerEventKind::Error);

        transport.inject(TransportEvent::Error {
            code: -1001,
            message: "socket closed".to_string(),
        });
        settle().await;

        assert_eq!(handle.state(), PlayerState::Error);
        assert!(!handle.retry_pending());
        let seen = errors.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].error.as_deref().unwrap().contains("socket closed"));
    }

    #[tokio::test]
    async fn test_update_target_rebinds_when_playing() {
        let (handle, transport) = handle_with(LoopbackBehavior::default(), no_retry());
        handle.connect(RoomConfig::new("room-1")).await.unwrap();
        settle().await;

        handle.update_target(DisplayTarget::slot(5)).await;

        assert_eq!(handle.display_target(), DisplayTarget::slot(5));
        assert_eq!(
            transport.binding(),
            Some(("loopback_room-1".to_string(), DisplayTarget::slot(5)))
        );
    }

    #[test]
    fn test_transport_error_maps_to_connection_error() {
        let err: AppError = TransportError::new(-3, "bind refused").into();
        assert!(matches!(err, AppError::Connection(_)));
    }
}
