use std::path::PathBuf;

use thiserror::Error;
use vigil_types::TypesError;

/// Errors from key handling and signing.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key material: {reason}")]
    InvalidKeyMaterial { reason: String },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("key file {path}: {reason}")]
    KeyFile { path: PathBuf, reason: String },

    #[error("key file {path}: public key does not match private key")]
    KeyMismatch { path: PathBuf },

    #[error("refusing to double sign: height {height} round {round} (last signed {last_height}/{last_round})")]
    DoubleSign {
        height: u64,
        round: u32,
        last_height: u64,
        last_round: u32,
    },

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
