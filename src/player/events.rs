//! Per-handle publish/subscribe surface

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::types::{HandleId, PlayerState};

/// Event kinds a handle publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerEventKind {
    StateChanged,
    Connected,
    Disconnected,
    Playing,
    Stopped,
    Error,
    Retry,
}

impl PlayerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerEventKind::StateChanged => "state_changed",
            PlayerEventKind::Connected => "connected",
            PlayerEventKind::Disconnected => "disconnected",
            PlayerEventKind::Playing => "playing",
            PlayerEventKind::Stopped => "stopped",
            PlayerEventKind::Error => "error",
            PlayerEventKind::Retry => "retry",
        }
    }
}

/// Payload delivered to subscribers
#[derive(Debug, Clone, Serialize)]
pub struct PlayerEventData {
    pub kind: PlayerEventKind,
    pub handle_id: HandleId,
    pub room_id: String,
    pub state: PlayerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
}

/// Token returned by [`EventChannel::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type EventCallback = Arc<dyn Fn(&PlayerEventData) + Send + Sync>;

/// Synchronous, order-preserving event delivery.
///
/// Every event other than `StateChanged` is followed by an implicit
/// `StateChanged` delivery carrying the same payload. The implicit delivery
/// goes through [`EventChannel::deliver`], which never re-emits.
pub struct EventChannel {
    subscribers: Mutex<HashMap<PlayerEventKind, Vec<(SubscriptionId, EventCallback)>>>,
    next_id: AtomicU64,
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, kind: PlayerEventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&PlayerEventData) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Returns false when the subscription was not registered for `kind`
    pub fn unsubscribe(&self, kind: PlayerEventKind, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock();
        let Some(list) = subscribers.get_mut(&kind) else {
            return false;
        };

        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() != before;

        if list.is_empty() {
            subscribers.remove(&kind);
        }
        removed
    }

    pub fn emit(&self, data: PlayerEventData) {
        self.deliver(data.kind, &data);

        if data.kind != PlayerEventKind::StateChanged {
            self.deliver(PlayerEventKind::StateChanged, &data);
        }
    }

    /// Deliver to the subscribers of `kind` only
    fn deliver(&self, kind: PlayerEventKind, data: &PlayerEventData) {
        // Snapshot so callbacks may subscribe/unsubscribe without deadlocking
        let callbacks: Vec<EventCallback> = match self.lock().get(&kind) {
            Some(list) => list.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return,
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(data))).is_err() {
                tracing::error!(
                    handle_id = %data.handle_id,
                    event = kind.as_str(),
                    "Event subscriber panicked"
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<PlayerEventKind, Vec<(SubscriptionId, EventCallback)>>>
    {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: PlayerEventKind) -> PlayerEventData {
        PlayerEventData {
            kind,
            handle_id: HandleId::from("player_test_1"),
            room_id: "room".to_string(),
            state: PlayerState::Connected,
            error: None,
            retry_count: 0,
        }
    }

    fn recorder(channel: &EventChannel, kind: PlayerEventKind) -> Arc<Mutex<Vec<PlayerEventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        channel.subscribe(kind, move |data| sink.lock().unwrap().push(data.kind));
        seen
    }

    #[test]
    fn test_emit_also_delivers_state_changed() {
        let channel = EventChannel::new();
        let connected = recorder(&channel, PlayerEventKind::Connected);
        let changed = recorder(&channel, PlayerEventKind::StateChanged);

        channel.emit(event(PlayerEventKind::Connected));

        assert_eq!(*connected.lock().unwrap(), vec![PlayerEventKind::Connected]);
        assert_eq!(*changed.lock().unwrap(), vec![PlayerEventKind::Connected]);
    }

    #[test]
    fn test_state_changed_is_not_re_emitted() {
        let channel = EventChannel::new();
        let changed = recorder(&channel, PlayerEventKind::StateChanged);

        channel.emit(event(PlayerEventKind::StateChanged));

        assert_eq!(changed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_delivery() {
        let channel = EventChannel::new();
        channel.subscribe(PlayerEventKind::Error, |_| panic!("boom"));
        let seen = recorder(&channel, PlayerEventKind::Error);

        channel.emit(event(PlayerEventKind::Error));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_and_clear() {
        let channel = EventChannel::new();
        let id = channel.subscribe(PlayerEventKind::Retry, |_| {});
        channel.subscribe(PlayerEventKind::Retry, |_| {});
        assert_eq!(channel.subscriber_count(), 2);

        assert!(channel.unsubscribe(PlayerEventKind::Retry, id));
        assert!(!channel.unsubscribe(PlayerEventKind::Retry, id));
        assert_eq!(channel.subscriber_count(), 1);

        channel.clear();
        assert_eq!(channel.subscriber_count(), 0);
    }
}
