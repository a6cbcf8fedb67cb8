use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::lock::DataDirLock;
use crate::memory::MemoryStore;
use crate::sqlite::SqliteStore;
use crate::trace::TraceStore;
use crate::traits::SharedStore;

/// Database file name inside the data directory.
pub const APPLICATION_DB: &str = "application.db";

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Sqlite => f.write_str("sqlite"),
            Backend::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for Backend {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(Backend::Sqlite),
            "memory" => Ok(Backend::Memory),
            other => Err(StorageError::UnknownBackend {
                name: other.to_string(),
            }),
        }
    }
}

/// A store opened for the life of the process, together with its directory lock.
pub struct OpenedStore {
    pub store: SharedStore,
    pub backend: Backend,
    _lock: DataDirLock,
    data_dir: PathBuf,
}

impl OpenedStore {
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl fmt::Debug for OpenedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedStore")
            .field("backend", &self.backend)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

/// Lock `data_dir`, open the selected backend in it and, when `trace_path` is
/// set, wrap the result in a [`TraceStore`].
pub fn open_store(
    data_dir: &Path,
    backend: Backend,
    trace_path: Option<&Path>,
) -> Result<OpenedStore, StorageError> {
    let lock = DataDirLock::acquire(data_dir)?;

    let base: SharedStore = match backend {
        Backend::Sqlite => Arc::new(SqliteStore::open(&data_dir.join(APPLICATION_DB))?),
        Backend::Memory => Arc::new(MemoryStore::new()),
    };
    let store = match trace_path {
        Some(path) => Arc::new(TraceStore::new(base, path)?) as SharedStore,
        None => base,
    };

    tracing::info!(backend = %backend, dir = %data_dir.display(), "opened application store");
    Ok(OpenedStore {
        store,
        backend,
        _lock: lock,
        data_dir: data_dir.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("sqlite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert_eq!("memory".parse::<Backend>().unwrap(), Backend::Memory);
        assert!("rocksdb".parse::<Backend>().is_err());
    }

    #[test]
    fn test_open_twice_is_locked() {
        let tmp = tempfile::tempdir().unwrap();
        let first = open_store(tmp.path(), Backend::Sqlite, None).unwrap();
        first.store.put(b"k", b"v").unwrap();
        let err = open_store(tmp.path(), Backend::Sqlite, None).unwrap_err();
        assert!(matches!(err, StorageError::Locked { .. }));
    }

    #[test]
    fn test_open_with_trace() {
        let tmp = tempfile::tempdir().unwrap();
        let trace = tmp.path().join("trace.jsonl");
        let opened = open_store(&tmp.path().join("data"), Backend::Memory, Some(&trace)).unwrap();
        opened.store.put(b"k", b"v").unwrap();
        assert!(std::fs::read_to_string(&trace).unwrap().contains("\"write\""));
        assert_eq!(opened.data_dir(), tmp.path().join("data"));
    }
}
