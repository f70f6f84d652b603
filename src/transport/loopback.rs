//! In-process transport that acknowledges every call locally.
//!
//! Used by the bundled binary when no media backend is wired in, and by tests
//! to script failures and count capability calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::player::DisplayTarget;

use super::{EnterRequest, Transport, TransportError, TransportEvent, TRANSPORT_EVENT_CAPACITY};

/// Type tag the loopback transport is registered under
pub const LOOPBACK_TYPE: &str = "loopback";

/// Scripted behavior of a [`LoopbackTransport`]
#[derive(Debug, Clone)]
pub struct LoopbackBehavior {
    /// Result code returned by `enter`; non-positive codes fail the connect
    pub enter_code: i32,
    /// Number of upcoming `enter` calls that fail outright
    pub failing_enters: u32,
    /// Publish `VideoAvailable` right after a successful enter
    pub publish_video: bool,
    pub fail_bind: bool,
    pub fail_exit: bool,
}

impl Default for LoopbackBehavior {
    fn default() -> Self {
        Self {
            enter_code: 1,
            failing_enters: 0,
            publish_video: true,
            fail_bind: false,
            fail_exit: false,
        }
    }
}

impl LoopbackBehavior {
    /// Enters succeed but no stream is ever published
    pub fn silent() -> Self {
        Self {
            publish_video: false,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct CallCounters {
    enter: AtomicUsize,
    exit: AtomicUsize,
    bind: AtomicUsize,
    unbind: AtomicUsize,
    release: AtomicUsize,
}

/// Snapshot of how often each capability was invoked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopbackCallCounts {
    pub enter: usize,
    pub exit: usize,
    pub bind: usize,
    pub unbind: usize,
    pub release: usize,
}

pub struct LoopbackTransport {
    behavior: Mutex<LoopbackBehavior>,
    events: broadcast::Sender<TransportEvent>,
    calls: CallCounters,
    room: Mutex<Option<String>>,
    binding: Mutex<Option<(String, DisplayTarget)>>,
}

impl LoopbackTransport {
    pub fn new(behavior: LoopbackBehavior) -> Self {
        let (events, _) = broadcast::channel(TRANSPORT_EVENT_CAPACITY);
        Self {
            behavior: Mutex::new(behavior),
            events,
            calls: CallCounters::default(),
            room: Mutex::new(None),
            binding: Mutex::new(None),
        }
    }

    pub fn set_behavior(&self, behavior: LoopbackBehavior) {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    pub fn calls(&self) -> LoopbackCallCounts {
        LoopbackCallCounts {
            enter: self.calls.enter.load(Ordering::Relaxed),
            exit: self.calls.exit.load(Ordering::Relaxed),
            bind: self.calls.bind.load(Ordering::Relaxed),
            unbind: self.calls.unbind.load(Ordering::Relaxed),
            release: self.calls.release.load(Ordering::Relaxed),
        }
    }

    /// Room the transport currently sits in
    pub fn current_room(&self) -> Option<String> {
        self.room.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Stream and target of the live video binding, if any
    pub fn binding(&self) -> Option<(String, DisplayTarget)> {
        self.binding.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Publish an event as if the backend had raised it
    pub fn inject(&self, event: TransportEvent) {
        // No receivers simply means nobody is listening yet
        let _ = self.events.send(event);
    }

    fn behavior(&self) -> LoopbackBehavior {
        self.behavior.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(LoopbackBehavior::default())
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn enter(&self, request: &EnterRequest) -> Result<i32, TransportError> {
        self.calls.enter.fetch_add(1, Ordering::Relaxed);

        let behavior = {
            let mut guard = self.behavior.lock().unwrap_or_else(|e| e.into_inner());
            if guard.failing_enters > 0 {
                guard.failing_enters -= 1;
                None
            } else {
                Some(guard.clone())
            }
        };
        let Some(behavior) = behavior else {
            return Err(TransportError::new(-1, "loopback enter refused"));
        };

        let code = behavior.enter_code;
        self.inject(TransportEvent::EnterResult { code });

        if code > 0 {
            *self.room.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.room_id.clone());
            if behavior.publish_video && request.auto_receive_video {
                self.inject(TransportEvent::VideoAvailable {
                    room_id: request.room_id.clone(),
                    stream_ref: format!("loopback_{}", request.room_id),
                    available: true,
                });
            }
        }

        Ok(code)
    }

    async fn exit(&self) -> Result<(), TransportError> {
        self.calls.exit.fetch_add(1, Ordering::Relaxed);

        if self.behavior().fail_exit {
            return Err(TransportError::new(-2, "loopback exit refused"));
        }

        *self.room.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.binding.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.inject(TransportEvent::ExitResult { reason: 0 });
        Ok(())
    }

    async fn bind_display(
        &self,
        stream_ref: &str,
        target: &DisplayTarget,
    ) -> Result<(), TransportError> {
        self.calls.bind.fetch_add(1, Ordering::Relaxed);

        if self.behavior().fail_bind {
            return Err(TransportError::new(-3, "loopback bind refused"));
        }

        *self.binding.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((stream_ref.to_string(), target.clone()));
        Ok(())
    }

    async fn unbind_display(&self, stream_ref: &str) -> Result<(), TransportError> {
        self.calls.unbind.fetch_add(1, Ordering::Relaxed);

        let mut binding = self.binding.lock().unwrap_or_else(|e| e.into_inner());
        if binding.as_ref().is_some_and(|(stream, _)| stream == stream_ref) {
            *binding = None;
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn release(&self) {
        self.calls.release.fetch_add(1, Ordering::Relaxed);
        *self.room.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.binding.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
