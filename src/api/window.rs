//! Window rotation and candidate room endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::directory::{DestroyRoomResult, RoomInfo};
use crate::error::AppError;
use crate::server::AppState;
use crate::window::{RotationReport, WindowStatus};

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomInfo>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub added: usize,
    pub window: WindowStatus,
}

// ============================================================================
// Window
// ============================================================================

/// GET /window
pub async fn window_status(State(state): State<AppState>) -> Json<WindowStatus> {
    Json(state.context.window().status())
}

/// POST /window/start
pub async fn window_start(State(state): State<AppState>) -> Result<Json<RotationReport>, AppError> {
    Ok(Json(state.context.window().start().await?))
}

/// POST /window/next
pub async fn window_next(State(state): State<AppState>) -> Result<Json<RotationReport>, AppError> {
    Ok(Json(state.context.window().next().await?))
}

/// POST /window/prev
pub async fn window_prev(State(state): State<AppState>) -> Result<Json<RotationReport>, AppError> {
    Ok(Json(state.context.window().prev().await?))
}

/// POST /window/refresh
pub async fn window_refresh(
    State(state): State<AppState>,
) -> Result<Json<RotationReport>, AppError> {
    Ok(Json(state.context.window().refresh().await?))
}

/// POST /window/stop
pub async fn window_stop(State(state): State<AppState>) -> Json<WindowStatus> {
    let window = state.context.window();
    window.stop().await;
    Json(window.status())
}

// ============================================================================
// Candidate rooms
// ============================================================================

/// GET /rooms - candidate list in window order
pub async fn list_rooms(State(state): State<AppState>) -> Json<RoomListResponse> {
    let rooms = state.context.window().candidates().await;
    let total = rooms.len();
    Json(RoomListResponse { rooms, total })
}

/// POST /rooms/load-more
pub async fn load_more_rooms(State(state): State<AppState>) -> Result<Json<LoadResponse>, AppError> {
    let window = state.context.window();
    let added = window.load_more().await?;
    Ok(Json(LoadResponse {
        added,
        window: window.status(),
    }))
}

/// POST /rooms/reload
pub async fn reload_rooms(State(state): State<AppState>) -> Result<Json<LoadResponse>, AppError> {
    let window = state.context.window();
    let added = window.reload().await?;
    Ok(Json(LoadResponse {
        added,
        window: window.status(),
    }))
}

/// POST /rooms/{room_id}/destroy - the directory's result code is passed
/// through; only transport-level failures become errors
pub async fn destroy_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<DestroyRoomResult>, AppError> {
    if room_id.trim().is_empty() {
        return Err(AppError::Validation("room id must not be empty".to_string()));
    }
    Ok(Json(state.context.window().destroy_room(&room_id).await?))
}
