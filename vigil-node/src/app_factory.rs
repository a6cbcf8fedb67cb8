//! Builds the application from configuration and a storage handle.

use vigil_app::{halt_from_flag, AppOptions, ModuleRegistry, VigilApp};
use vigil_storage::SharedStore;

use crate::config::Configuration;
use crate::error::NodeError;

/// Construction options exactly as configured. Halt values of `0` become `None`;
/// every other value is passed through untouched.
pub fn app_options(config: &Configuration) -> Result<AppOptions, NodeError> {
    Ok(AppOptions {
        pruning: config.pruning()?,
        halt_height: halt_from_flag(config.app.halt_height),
        halt_time: halt_from_flag(config.app.halt_time),
        min_gas_prices: config.min_gas_prices()?,
    })
}

/// Application with the built-in genesis modules, resumed from `store`.
pub fn build_application(
    config: &Configuration,
    store: SharedStore,
) -> Result<VigilApp, NodeError> {
    let options = app_options(config)?;
    let app = VigilApp::new(store, options, ModuleRegistry::with_default_modules())?;
    Ok(app)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use vigil_app::PruningStrategy;
    use vigil_storage::memory::MemoryStore;

    #[test]
    fn test_halt_passthrough() {
        let mut config = Configuration::default();
        config.app.halt_height = 100;
        config.app.halt_time = 0;
        let options = app_options(&config).unwrap();
        assert_eq!(options.halt_height, Some(100));
        assert_eq!(options.halt_time, None);

        config.app.halt_height = 0;
        config.app.halt_time = 1_700_000_000;
        let options = app_options(&config).unwrap();
        assert_eq!(options.halt_height, None);
        assert_eq!(options.halt_time, Some(1_700_000_000));
    }

    #[test]
    fn test_options_reach_application() {
        let mut config = Configuration::default();
        config.app.pruning = "everything".to_string();
        config.app.halt_height = 7;
        config.app.min_gas_prices = "0.5uvigil".to_string();
        let app = build_application(&config, Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(app.options().pruning, PruningStrategy::Everything);
        assert_eq!(app.options().halt_height, Some(7));
        assert_eq!(app.options().min_gas_prices.to_string(), "0.5uvigil");
        assert_eq!(
            app.registry().names(),
            vec!["auth", "staking", "checkpoint", "chainmanager"]
        );
    }

    #[test]
    fn test_bad_pruning_is_config_error() {
        let mut config = Configuration::default();
        config.app.pruning = "aggressive".to_string();
        let result = build_application(&config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(NodeError::ConfigError { .. })));
    }
}
