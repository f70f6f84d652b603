use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::players::{get_player, list_players};
use super::window::{
    destroy_room, list_rooms, load_more_rooms, reload_rooms, window_next, window_prev,
    window_refresh, window_start, window_status, window_stop,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Handles
        .route("/players", get(list_players))
        .route("/players/{id}", get(get_player))
        // Window
        .route("/window", get(window_status))
        .route("/window/start", post(window_start))
        .route("/window/next", post(window_next))
        .route("/window/prev", post(window_prev))
        .route("/window/refresh", post(window_refresh))
        .route("/window/stop", post(window_stop))
        // Candidate rooms
        .route("/rooms", get(list_rooms))
        .route("/rooms/load-more", post(load_more_rooms))
        .route("/rooms/reload", post(reload_rooms))
        .route("/rooms/{room_id}/destroy", post(destroy_room))
}
