mod settings;

pub use settings::{
    CredentialConfig, DirectoryConfig, HealthConfig, LogFormat, LoggingConfig, MonitorConfig,
    PlayerSettings, ServerConfig, Settings,
};
