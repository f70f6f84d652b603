//! Connection handles (players) and their building blocks

mod events;
mod factory;
mod handle;
mod types;

pub use events::{EventCallback, EventChannel, PlayerEventData, PlayerEventKind, SubscriptionId};
pub use factory::{PlayerFactory, TransportConstructor};
pub use handle::ConnectionHandle;
pub use types::{
    DisplayTarget, HandleId, PlayerConfig, PlayerInfo, PlayerSnapshot, PlayerState, RetryPolicy,
    RoomConfig, AUDIENCE_ROLE,
};
