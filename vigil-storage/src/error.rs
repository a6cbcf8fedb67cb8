use std::path::PathBuf;

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("read error: {reason}")]
    ReadError { reason: String },

    #[error("write error: {reason}")]
    WriteError { reason: String },

    #[error("batch error: {reason}")]
    BatchError { reason: String },

    #[error("SQLite error: {reason}")]
    SqliteError { reason: String },

    #[error("data directory {} is locked by another process{}", path.display(), holder(pid))]
    Locked { path: PathBuf, pid: Option<u32> },

    #[error("unknown storage backend '{name}'")]
    UnknownBackend { name: String },

    #[error("trace error: {reason}")]
    TraceError { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn holder(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!(" (pid {})", pid),
        None => String::new(),
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::SqliteError {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_message_includes_pid() {
        let err = StorageError::Locked {
            path: PathBuf::from("/tmp/data/LOCK"),
            pid: Some(42),
        };
        assert_eq!(
            err.to_string(),
            "data directory /tmp/data/LOCK is locked by another process (pid 42)"
        );
    }

    #[test]
    fn test_locked_message_without_pid() {
        let err = StorageError::Locked {
            path: PathBuf::from("/tmp/data/LOCK"),
            pid: None,
        };
        assert!(err.to_string().ends_with("another process"));
    }
}
