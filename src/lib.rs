// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Capabilities consumed by the core
pub mod credential;
pub mod directory;
pub mod transport;

// Core
pub mod health;
pub mod player;
pub mod pool;
pub mod tasks;
pub mod window;

// Application layer
pub mod api;
pub mod context;
pub mod server;
pub mod shutdown;
