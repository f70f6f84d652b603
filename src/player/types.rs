//! Handle identity, state, configuration and snapshot types

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Role used when entering a room as a passive viewer
pub const AUDIENCE_ROLE: u32 = 21;

/// Opaque handle identifier (`player_<type>_<uuid>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(String);

impl HandleId {
    pub fn generate(player_type: &str) -> Self {
        Self(format!("player_{}_{}", player_type, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for HandleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Idle,
    Connecting,
    Connected,
    Playing,
    Paused,
    Stopped,
    Error,
    Destroyed,
}

impl PlayerState {
    pub const ALL: [PlayerState; 8] = [
        PlayerState::Idle,
        PlayerState::Connecting,
        PlayerState::Connected,
        PlayerState::Playing,
        PlayerState::Paused,
        PlayerState::Stopped,
        PlayerState::Error,
        PlayerState::Destroyed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Connecting => "connecting",
            PlayerState::Connected => "connected",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Stopped => "stopped",
            PlayerState::Error => "error",
            PlayerState::Destroyed => "destroyed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerState::Destroyed)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the surface a handle renders video into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayTarget(String);

impl DisplayTarget {
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    /// Target of the `index`-th slot of the monitoring grid
    pub fn slot(index: usize) -> Self {
        Self(format!("stream_container_{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Automatic retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub auto_retry: bool,
    pub max_retry_count: u32,
    pub retry_delay_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            auto_retry: true,
            max_retry_count: 3,
            retry_delay_base_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: `base * (retry_count + 1)`
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        Duration::from_millis(
            self.retry_delay_base_ms
                .saturating_mul(u64::from(retry_count) + 1),
        )
    }

    pub fn allows(&self, retry_count: u32) -> bool {
        self.auto_retry && retry_count < self.max_retry_count
    }
}

/// Full configuration of one handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub player_type: String,
    pub subject_id: String,
    /// Signature issued for `subject_id`
    #[serde(default, skip_serializing)]
    pub credential: Option<String>,
    pub display_target: DisplayTarget,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Free-form settings forwarded to the transport constructor
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl PlayerConfig {
    pub fn new(
        player_type: impl Into<String>,
        subject_id: impl Into<String>,
        display_target: DisplayTarget,
    ) -> Self {
        Self {
            player_type: player_type.into(),
            subject_id: subject_id.into(),
            credential: None,
            display_target,
            retry: RetryPolicy::default(),
            extra: HashMap::new(),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.player_type.is_empty() {
            return Err(AppError::Validation("player type is required".to_string()));
        }
        if self.subject_id.is_empty() {
            return Err(AppError::Configuration("subject id is required".to_string()));
        }
        Ok(())
    }
}

/// Room a handle is asked to join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub room_id: String,
    #[serde(default = "default_role")]
    pub role: u32,
    #[serde(default = "default_true")]
    pub auto_receive_video: bool,
    #[serde(default = "default_true")]
    pub auto_receive_audio: bool,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_role() -> u32 {
    AUDIENCE_ROLE
}

fn default_true() -> bool {
    true
}

impl RoomConfig {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            role: AUDIENCE_ROLE,
            auto_receive_video: true,
            auto_receive_audio: true,
            extra: HashMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.room_id.trim().is_empty() {
            return Err(AppError::Validation("room id is required".to_string()));
        }
        Ok(())
    }
}

/// Point-in-time view of a handle
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub id: HandleId,
    pub player_type: String,
    pub state: PlayerState,
    pub room_id: String,
    pub is_connected: bool,
    pub is_playing: bool,
    pub retry_count: u32,
    pub retry_pending: bool,
    pub last_error: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub subject_id: String,
    pub display_target: DisplayTarget,
    pub created_at: DateTime<Utc>,
}

/// Static identity of a handle
#[derive(Debug, Clone, Serialize)]
pub struct PlayerInfo {
    pub id: HandleId,
    pub player_type: String,
    pub subject_id: String,
    pub display_target: DisplayTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_strictly_increases() {
        let policy = RetryPolicy {
            auto_retry: true,
            max_retry_count: 5,
            retry_delay_base_ms: 250,
        };

        let delays: Vec<_> = (0..5).map(|n| policy.delay_for(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(250));
        assert_eq!(delays[2], Duration::from_millis(750));
        assert!(delays.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_retry_policy_allows_until_max() {
        let policy = RetryPolicy::default();
        assert!(policy.allows(0));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));

        let disabled = RetryPolicy {
            auto_retry: false,
            ..RetryPolicy::default()
        };
        assert!(!disabled.allows(0));
    }

    #[test]
    fn test_handle_id_embeds_type() {
        let a = HandleId::generate("loopback");
        let b = HandleId::generate("loopback");
        assert!(a.as_str().starts_with("player_loopback_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_room_config_defaults_and_validation() {
        let room: RoomConfig = serde_json::from_str(r#"{"room_id":"r1"}"#).unwrap();
        assert_eq!(room.role, AUDIENCE_ROLE);
        assert!(room.auto_receive_video);
        assert!(room.validate().is_ok());

        assert!(RoomConfig::new("  ").validate().is_err());
    }
}
