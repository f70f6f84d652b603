//! API layer - HTTP control surface organized by concern.

mod health;
mod metrics;
mod players;
mod routes;
mod window;

pub use health::{health, stats, HealthResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use players::{get_player, list_players, PlayerListResponse};
pub use routes::api_routes;
pub use window::{LoadResponse, RoomListResponse};
