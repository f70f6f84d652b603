//! Media transport capability consumed by connection handles
//!
//! A transport knows how to enter/exit a room and bind a remote video stream
//! to a display target. Everything it learns asynchronously (stream
//! availability, remote exits, errors) is published on its event source.

mod loopback;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::player::{DisplayTarget, RoomConfig};

pub use loopback::{LoopbackBehavior, LoopbackCallCounts, LoopbackTransport, LOOPBACK_TYPE};

/// Capacity of a transport's event broadcast channel
pub const TRANSPORT_EVENT_CAPACITY: usize = 64;

/// Failure reported by a transport call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error {code}: {message}")]
pub struct TransportError {
    pub code: i32,
    pub message: String,
}

impl TransportError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Asynchronous notifications emitted by a transport.
///
/// Stream availability carries the room it was published in, so a handle can
/// tell a late event of a room it already left from one of its current room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    VideoAvailable {
        room_id: String,
        stream_ref: String,
        available: bool,
    },
    AudioAvailable {
        room_id: String,
        stream_ref: String,
        available: bool,
    },
    /// Positive codes acknowledge a successful enter
    EnterResult { code: i32 },
    ExitResult { reason: i32 },
    Error { code: i32, message: String },
    ConnectionStateChanged { state: String },
}

/// Parameters for entering a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnterRequest {
    pub room_id: String,
    pub subject_id: String,
    pub credential: Option<String>,
    pub role: u32,
    pub auto_receive_video: bool,
    pub auto_receive_audio: bool,
}

impl EnterRequest {
    pub fn new(room: &RoomConfig, subject_id: &str, credential: Option<&str>) -> Self {
        Self {
            room_id: room.room_id.clone(),
            subject_id: subject_id.to_string(),
            credential: credential.map(str::to_string),
            role: room.role,
            auto_receive_video: room.auto_receive_video,
            auto_receive_audio: room.auto_receive_audio,
        }
    }
}

/// Capability set a connection handle drives.
///
/// `enter` returns the backend's enter result code; a non-positive code is a
/// failed connect even though the call itself succeeded. Implementations must
/// publish `ExitResult` for every `exit` they complete.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn enter(&self, request: &EnterRequest) -> Result<i32, TransportError>;

    async fn exit(&self) -> Result<(), TransportError>;

    async fn bind_display(
        &self,
        stream_ref: &str,
        target: &DisplayTarget,
    ) -> Result<(), TransportError>;

    async fn unbind_display(&self, stream_ref: &str) -> Result<(), TransportError>;

    /// Subscribe to the transport's event source
    fn events(&self) -> broadcast::Receiver<TransportEvent>;

    /// Release every resource held by the transport. Called once, on destroy.
    async fn release(&self);
}
