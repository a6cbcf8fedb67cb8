use thiserror::Error;

use crate::sidecar::SidecarError;

/// Errors that can occur in the node.
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum NodeError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("malformed key: {reason}")]
    MalformedKey { reason: String },

    #[error("failed to bind application transport on {addr}: {reason}")]
    TransportBindError { addr: String, reason: String },

    #[error("consensus engine failed to start: {reason}")]
    EngineStartError { reason: String },

    #[error("sidecar error: {0}")]
    Sidecar(#[from] SidecarError),

    #[error("genesis verification failed in module '{module}': {reason}")]
    GenesisVerificationError { module: String, reason: String },

    #[error("genesis error: {reason}")]
    GenesisError { reason: String },

    #[error("application error: {0}")]
    Application(#[from] vigil_app::AppError),

    #[error("storage error: {0}")]
    Storage(#[from] vigil_storage::StorageError),

    #[error("identity error: {0}")]
    Identity(#[from] vigil_crypto::error::CryptoError),

    #[error("profiler error: {reason}")]
    Profiler { reason: String },

    #[error("rpc error: {reason}")]
    Rpc { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<vigil_types::TypesError> for NodeError {
    fn from(err: vigil_types::TypesError) -> Self {
        match err {
            vigil_types::TypesError::MalformedKey { reason } => NodeError::MalformedKey { reason },
            other => NodeError::GenesisError {
                reason: other.to_string(),
            },
        }
    }
}

impl From<vigil_app::GenesisFailure> for NodeError {
    fn from(failure: vigil_app::GenesisFailure) -> Self {
        NodeError::GenesisVerificationError {
            module: failure.module,
            reason: failure.error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_app::{GenesisFailure, ModuleError};

    #[test]
    fn test_config_error_display() {
        let err = NodeError::ConfigError {
            reason: "missing field".to_string(),
        };
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_genesis_failure_keeps_module_and_message() {
        let err: NodeError = GenesisFailure {
            module: "staking".to_string(),
            error: ModuleError::invalid("validator 3 has zero power"),
        }
        .into();
        match err {
            NodeError::GenesisVerificationError { module, reason } => {
                assert_eq!(module, "staking");
                assert_eq!(reason, "validator 3 has zero power");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_malformed_key_maps_through() {
        let err: NodeError = vigil_types::TypesError::MalformedKey {
            reason: "expected 65 bytes, got 3".to_string(),
        }
        .into();
        assert!(matches!(err, NodeError::MalformedKey { .. }));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let node_err: NodeError = io_err.into();
        assert!(matches!(node_err, NodeError::Io(_)));
    }
}
