//! Transport factory keyed by player type tag

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{AppError, Result};
use crate::transport::{LoopbackTransport, Transport, LOOPBACK_TYPE};

use super::types::PlayerConfig;

/// Builds the transport a handle of a given type drives
pub type TransportConstructor =
    Arc<dyn Fn(&PlayerConfig) -> Result<Arc<dyn Transport>> + Send + Sync>;

/// Registry mapping a type tag to its transport constructor.
///
/// New backends are added with [`PlayerFactory::register`]; the registry
/// itself never needs to know about them.
pub struct PlayerFactory {
    constructors: RwLock<BTreeMap<String, TransportConstructor>>,
}

impl PlayerFactory {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry with the bundled loopback transport
    pub fn with_defaults() -> Self {
        let factory = Self::new();
        factory.register(LOOPBACK_TYPE, |_config| {
            Ok(Arc::new(LoopbackTransport::default()) as Arc<dyn Transport>)
        });
        factory
    }

    /// Register (or replace) the constructor for `player_type`
    pub fn register<F>(&self, player_type: impl Into<String>, constructor: F)
    where
        F: Fn(&PlayerConfig) -> Result<Arc<dyn Transport>> + Send + Sync + 'static,
    {
        let player_type = player_type.into();
        tracing::debug!(player_type = %player_type, "Registering player type");
        self.constructors
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(player_type, Arc::new(constructor));
    }

    pub fn supported_types(&self) -> Vec<String> {
        self.constructors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_supported(&self, player_type: &str) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(player_type)
    }

    /// Build a transport for `config.player_type`
    pub fn create(&self, config: &PlayerConfig) -> Result<Arc<dyn Transport>> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&config.player_type)
            .cloned();

        match constructor {
            Some(constructor) => constructor(config),
            None => Err(AppError::Validation(format!(
                "unsupported player type: {}",
                config.player_type
            ))),
        }
    }
}

impl Default for PlayerFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::DisplayTarget;

    fn config(player_type: &str) -> PlayerConfig {
        PlayerConfig::new(player_type, "live_1", DisplayTarget::slot(0))
    }

    #[test]
    fn test_defaults_support_loopback() {
        let factory = PlayerFactory::with_defaults();
        assert!(factory.is_supported(LOOPBACK_TYPE));
        assert_eq!(factory.supported_types(), vec![LOOPBACK_TYPE.to_string()]);
        assert!(factory.create(&config(LOOPBACK_TYPE)).is_ok());
    }

    #[test]
    fn test_unknown_type_is_validation_error() {
        let factory = PlayerFactory::with_defaults();
        let err = factory.create(&config("rtmp")).err().unwrap();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("unsupported player type"));
    }

    #[test]
    fn test_register_custom_type() {
        let factory = PlayerFactory::new();
        assert!(!factory.is_supported("custom"));

        factory.register("custom", |_| {
            Ok(Arc::new(LoopbackTransport::default()) as Arc<dyn Transport>)
        });
        assert!(factory.is_supported("custom"));
        assert!(factory.create(&config("custom")).is_ok());
    }

    #[test]
    fn test_constructor_errors_propagate() {
        let factory = PlayerFactory::new();
        factory.register("broken", |_| {
            Err(AppError::Configuration("backend unavailable".to_string()))
        });
        assert!(matches!(
            factory.create(&config("broken")),
            Err(AppError::Configuration(_))
        ));
    }
}
