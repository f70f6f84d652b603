//! Read-only views of the pool's handles.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::player::{HandleId, PlayerSnapshot};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct PlayerListQuery {
    #[serde(rename = "type")]
    pub player_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlayerListResponse {
    pub players: Vec<PlayerSnapshot>,
    pub total: usize,
}

/// GET /players - snapshots in creation order, optionally `?type=` filtered
pub async fn list_players(
    State(state): State<AppState>,
    Query(query): Query<PlayerListQuery>,
) -> Json<PlayerListResponse> {
    let pool = state.context.pool();
    let handles = match query.player_type.as_deref() {
        Some(player_type) => pool.handles_by_type(player_type),
        None => pool.handles(),
    };

    let players: Vec<PlayerSnapshot> = handles.iter().map(|h| h.snapshot()).collect();
    let total = players.len();
    Json(PlayerListResponse { players, total })
}

/// GET /players/{id}
pub async fn get_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlayerSnapshot>, AppError> {
    state
        .context
        .pool()
        .get(&HandleId::from(id.as_str()))
        .map(|handle| Json(handle.snapshot()))
        .ok_or_else(|| AppError::NotFound(format!("player not found: {}", id)))
}
