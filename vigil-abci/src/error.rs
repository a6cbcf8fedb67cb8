use thiserror::Error;

/// Errors in the engine/application protocol layer.
#[derive(Debug, Error)]
pub enum AbciError {
    /// The application rejected a request.
    #[error("application error: {reason}")]
    Application { reason: String },

    #[error("codec error: {reason}")]
    CodecError { reason: String },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("protocol version mismatch: peer sent v{peer}, we run v{ours}")]
    VersionMismatch { peer: u8, ours: u8 },

    /// The response variant does not match the request.
    #[error("unexpected response to {request}: {response}")]
    UnexpectedResponse { request: String, response: String },

    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("unsupported listen address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
