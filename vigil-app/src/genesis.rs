//! Application genesis state and the registry of per-module genesis verifiers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error reported by a single module's genesis check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("failed to decode genesis section: {reason}")]
    Decode { reason: String },

    #[error("{reason}")]
    Invalid { reason: String },
}

impl ModuleError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ModuleError::Invalid {
            reason: reason.into(),
        }
    }
}

/// The first module that rejected the genesis state, with its error as returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("genesis verification failed in module '{module}': {error}")]
pub struct GenesisFailure {
    pub module: String,
    pub error: ModuleError,
}

/// The application part of the genesis document: one JSON section per module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppGenesisState(Map<String, Value>);

impl AppGenesisState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts a JSON object, or `null` for an empty state.
    pub fn from_value(value: Value) -> Result<Self, ModuleError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(ModuleError::Decode {
                reason: format!("app_state must be a JSON object, got {}", type_name(&other)),
            }),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModuleError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(bytes).map_err(|e| ModuleError::Decode {
            reason: e.to_string(),
        })?;
        Self::from_value(value)
    }

    pub fn section(&self, module: &str) -> Option<&Value> {
        self.0.get(module)
    }

    pub fn set_section(&mut self, module: &str, value: Value) {
        self.0.insert(module.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // A map of JSON values always serializes.
        serde_json::to_vec(&self.0).unwrap_or_default()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode a module section, falling back to the type's default when absent.
pub fn decode_section<T>(section: Option<&Value>) -> Result<T, ModuleError>
where
    T: DeserializeOwned + Default,
{
    match section {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => T::deserialize(value).map_err(|e| ModuleError::Decode {
            reason: e.to_string(),
        }),
    }
}

/// A business module's genesis contract.
pub trait GenesisVerifier: Send + Sync {
    /// Key of the module's section in the app state.
    fn name(&self) -> &'static str;

    /// Check the module's section. `None` when the section is absent.
    fn verify_genesis(&self, section: Option<&Value>) -> Result<(), ModuleError>;

    /// Section written by `init` for a fresh chain.
    fn default_genesis(&self) -> Value;
}

/// Ordered list of genesis verifiers, fixed when the application is assembled.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Vec<Box<dyn GenesisVerifier>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in modules in their canonical order.
    pub fn with_default_modules() -> Self {
        let mut registry = Self::new();
        registry
            .register(crate::modules::auth::AuthModule)
            .register(crate::modules::staking::StakingModule)
            .register(crate::modules::checkpoint::CheckpointModule)
            .register(crate::modules::chainmanager::ChainManagerModule);
        registry
    }

    pub fn register(&mut self, module: impl GenesisVerifier + 'static) -> &mut Self {
        self.modules.push(Box::new(module));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Run every verifier in registration order and stop at the first failure.
    pub fn verify_genesis(&self, state: &AppGenesisState) -> Result<(), GenesisFailure> {
        for module in &self.modules {
            module
                .verify_genesis(state.section(module.name()))
                .map_err(|error| GenesisFailure {
                    module: module.name().to_string(),
                    error,
                })?;
            tracing::debug!(module = module.name(), "genesis section verified");
        }
        Ok(())
    }

    pub fn default_genesis(&self) -> AppGenesisState {
        let mut state = AppGenesisState::new();
        for module in &self.modules {
            state.set_section(module.name(), module.default_genesis());
        }
        state
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}
