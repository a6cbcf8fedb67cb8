use thiserror::Error;

/// Errors produced while decoding or validating shared types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    // ─── Identity Errors ─────────────────────────────────────────────────────
    #[error("malformed key: {reason}")]
    MalformedKey { reason: String },

    #[error("invalid address: {reason}")]
    InvalidAddress { reason: String },

    // ─── Genesis Errors ──────────────────────────────────────────────────────
    #[error("invalid genesis document: {reason}")]
    InvalidGenesis { reason: String },

    // ─── Serialization Errors ────────────────────────────────────────────────
    #[error("deserialization error: {reason}")]
    DeserializationError { reason: String },
}
