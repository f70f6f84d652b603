//! Room directory: paginated candidate rooms and remote room destruction

mod memory;

pub use memory::StaticRoomDirectory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Largest page a directory may be asked for
pub const MAX_PAGE_SIZE: usize = 20;

/// Live room record as published by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    #[serde(rename = "RoomId", alias = "roomid", alias = "room_id")]
    pub room_id: String,
    #[serde(rename = "RoomName", alias = "roomname", alias = "room_name", default)]
    pub room_name: String,
    #[serde(rename = "Owner_Account", alias = "owner_account", default)]
    pub owner_account: String,
    #[serde(rename = "CoverURL", alias = "coverurl", alias = "cover_url", default)]
    pub cover_url: String,
    #[serde(rename = "Category", alias = "category", default)]
    pub category: Vec<serde_json::Value>,
    #[serde(rename = "ActivityStatus", alias = "activitystatus", alias = "activity_status", default)]
    pub activity_status: i64,
    #[serde(rename = "CreateTime", alias = "createtime", alias = "create_time", default)]
    pub create_time: i64,
    #[serde(rename = "ViewCount", alias = "viewcount", alias = "view_count", default)]
    pub view_count: u64,
    #[serde(rename = "Popularity", alias = "popularity", default)]
    pub popularity: u64,
    #[serde(
        rename = "IsUnlimitedRoomEnabled",
        alias = "isunlimitedroomenabled",
        alias = "is_unlimited_room_enabled",
        default
    )]
    pub is_unlimited_room_enabled: bool,
    #[serde(rename = "StreamUrl", alias = "streamurl", alias = "stream_url", default)]
    pub stream_url: String,
}

impl RoomInfo {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            room_name: String::new(),
            owner_account: String::new(),
            cover_url: String::new(),
            category: Vec::new(),
            activity_status: 0,
            create_time: 0,
            view_count: 0,
            popularity: 0,
            is_unlimited_room_enabled: false,
            stream_url: String::new(),
        }
    }
}

/// One page of rooms. An empty `next_cursor` means the listing is exhausted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomPage {
    #[serde(rename = "RoomList")]
    pub rooms: Vec<RoomInfo>,
    #[serde(rename = "Next")]
    pub next_cursor: String,
}

/// Outcome of a remote destroy; `code == 0` is success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyRoomResult {
    pub code: i32,
    pub message: String,
}

impl DestroyRoomResult {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Fetch up to `count` rooms starting at `cursor` (`""` or `"0"` is the start)
    async fn list_rooms(&self, cursor: &str, count: usize) -> Result<RoomPage>;

    async fn destroy_room(&self, room_id: &str) -> Result<DestroyRoomResult>;
}

pub fn validate_page_size(count: usize) -> Result<()> {
    if count > MAX_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "count must not exceed {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok(())
}
