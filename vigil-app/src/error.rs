use thiserror::Error;
use vigil_abci::AbciError;

use crate::genesis::GenesisFailure;

/// Errors raised by the application state machine.
#[derive(Debug, Error)]
pub enum AppError {
    /// A configured halt condition was reached; the block is not committed.
    #[error("halt reached at height {height}: {reason}")]
    Halted { height: u64, reason: String },

    #[error("unknown pruning strategy '{name}', expected one of: syncable, nothing, everything")]
    InvalidPruning { name: String },

    #[error("invalid minimum gas prices '{value}': {reason}")]
    InvalidGasPrices { value: String, reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("corrupt application state: {reason}")]
    CorruptState { reason: String },

    #[error(transparent)]
    Genesis(#[from] GenesisFailure),

    #[error("storage error: {0}")]
    Storage(#[from] vigil_storage::StorageError),
}

impl From<AppError> for AbciError {
    fn from(err: AppError) -> Self {
        AbciError::Application {
            reason: err.to_string(),
        }
    }
}
