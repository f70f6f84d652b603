//! In-memory room directory over a fixed candidate list

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{AppError, Result};

use super::{validate_page_size, DestroyRoomResult, RoomDirectory, RoomInfo, RoomPage};

#[derive(Debug, Clone)]
struct Entry {
    room: RoomInfo,
    destroyed: bool,
}

/// Pages over a configured room list with a numeric offset cursor.
///
/// Destroyed rooms stay in the list as tombstones that paging skips, so an
/// offset handed out earlier still points at the same position.
pub struct StaticRoomDirectory {
    entries: RwLock<Vec<Entry>>,
}

impl StaticRoomDirectory {
    pub fn new(rooms: Vec<RoomInfo>) -> Self {
        Self {
            entries: RwLock::new(
                rooms
                    .into_iter()
                    .map(|room| Entry {
                        room,
                        destroyed: false,
                    })
                    .collect(),
            ),
        }
    }

    /// Directory with `count` generated rooms (`room_0`, `room_1`, ...)
    pub fn with_generated(count: usize) -> Self {
        Self::new((0..count).map(|i| RoomInfo::new(format!("room_{}", i))).collect())
    }

    pub fn add_room(&self, room: RoomInfo) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Entry {
                room,
                destroyed: false,
            });
    }

    /// Number of rooms that have not been destroyed
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|entry| !entry.destroyed)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RoomDirectory for StaticRoomDirectory {
    async fn list_rooms(&self, cursor: &str, count: usize) -> Result<RoomPage> {
        validate_page_size(count)?;

        let offset = if cursor.is_empty() {
            0
        } else {
            cursor
                .parse::<usize>()
                .map_err(|_| AppError::Validation(format!("invalid cursor: {}", cursor)))?
        };

        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut position = offset.min(entries.len());
        let mut rooms = Vec::with_capacity(count);
        while position < entries.len() && rooms.len() < count {
            let entry = &entries[position];
            if !entry.destroyed {
                rooms.push(entry.room.clone());
            }
            position += 1;
        }

        let has_more = entries[position..].iter().any(|entry| !entry.destroyed);
        let next_cursor = if has_more {
            position.to_string()
        } else {
            String::new()
        };

        Ok(RoomPage { rooms, next_cursor })
    }

    async fn destroy_room(&self, room_id: &str) -> Result<DestroyRoomResult> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let live = entries
            .iter_mut()
            .find(|entry| !entry.destroyed && entry.room.room_id == room_id);

        match live {
            Some(entry) => {
                entry.destroyed = true;
                tracing::info!(room_id = %room_id, "Room destroyed");
                Ok(DestroyRoomResult {
                    code: 0,
                    message: "success".to_string(),
                })
            }
            None => Ok(DestroyRoomResult {
                code: -1,
                message: format!("room not found: {}", room_id),
            }),
        }
    }
}
