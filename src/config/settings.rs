use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::directory::{RoomInfo, MAX_PAGE_SIZE};
use crate::error::AppError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub player: PlayerSettings,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub credential: CredentialConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Window size, also the number of handles created at startup
    #[serde(default = "default_concurrent_monitors")]
    pub concurrent_monitors: usize,
    /// Rooms fetched per directory page (at most 20)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Pause between tearing a connection down and re-establishing it
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Apply the first window right after startup
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerSettings {
    #[serde(default = "default_player_type")]
    pub default_type: String,
    #[serde(default = "default_true")]
    pub auto_retry: bool,
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    /// Base of the linear backoff: attempt N waits `retry_delay_ms * N`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub app_id: u64,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_expire_secs")]
    pub expire_secs: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub rooms: Vec<RoomInfo>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_concurrent_monitors() -> usize {
    7
}

fn default_page_size() -> usize {
    14
}

fn default_settle_delay_ms() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_player_type() -> String {
    crate::transport::LOOPBACK_TYPE.to_string()
}

fn default_max_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_health_interval_ms() -> u64 {
    30_000
}

fn default_expire_secs() -> i64 {
    604_800 // 7 days
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("monitor.concurrent_monitors", default_concurrent_monitors() as i64)?
            .set_default("monitor.page_size", default_page_size() as i64)?
            .set_default("monitor.settle_delay_ms", default_settle_delay_ms() as i64)?
            .set_default("health.interval_ms", default_health_interval_ms() as i64)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // MONITOR__SERVER__PORT, MONITOR__PLAYER__RETRY_DELAY_MS, ...
            .add_source(
                Environment::with_prefix("MONITOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Reject values the monitor cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.monitor.concurrent_monitors == 0 {
            return Err(AppError::Validation(
                "monitor.concurrent_monitors must be at least 1".to_string(),
            ));
        }
        if self.monitor.page_size == 0 || self.monitor.page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "monitor.page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if self.health.enabled && self.health.interval_ms == 0 {
            return Err(AppError::Validation(
                "health.interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            concurrent_monitors: default_concurrent_monitors(),
            page_size: default_page_size(),
            settle_delay_ms: default_settle_delay_ms(),
            auto_start: true,
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_type: default_player_type(),
            auto_retry: true,
            max_retry_count: default_max_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_health_interval_ms(),
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            app_id: 0,
            secret: String::new(),
            expire_secs: default_expire_secs(),
        }
    }
}
