use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::StorageError;
use crate::traits::{BatchOp, KvPairs, KvStore, SharedStore};

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum TraceOperation {
    Write,
    Delete,
}

#[derive(Serialize)]
struct TraceEntry<'a> {
    operation: TraceOperation,
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch: Option<&'a str>,
}

/// Wraps a store and appends every mutation to a file as one JSON line.
///
/// Reads pass straight through. Keys and values are hex-encoded.
pub struct TraceStore {
    inner: SharedStore,
    out: Mutex<BufWriter<File>>,
}

impl TraceStore {
    pub fn new(inner: SharedStore, trace_path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = trace_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(trace_path)?;
        tracing::info!(path = %trace_path.display(), "tracing store writes");
        Ok(Self {
            inner,
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    fn record(&self, entry: TraceEntry<'_>) -> Result<(), StorageError> {
        let line = serde_json::to_string(&entry).map_err(|e| StorageError::TraceError {
            reason: e.to_string(),
        })?;
        let mut out = self.out.lock().map_err(|e| StorageError::TraceError {
            reason: e.to_string(),
        })?;
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }

    fn record_op(&self, op: &BatchOp, batch: Option<&str>) -> Result<(), StorageError> {
        let entry = match op {
            BatchOp::Put { key, value } => TraceEntry {
                operation: TraceOperation::Write,
                key: hex::encode(key),
                value: Some(hex::encode(value)),
                batch,
            },
            BatchOp::Delete { key } => TraceEntry {
                operation: TraceOperation::Delete,
                key: hex::encode(key),
                value: None,
                batch,
            },
        };
        self.record(entry)
    }
}

impl KvStore for TraceStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.inner.put(key, value)?;
        self.record_op(&BatchOp::put(key, value), None)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.inner.delete(key)?;
        self.record_op(&BatchOp::delete(key), None)
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        self.inner.exists(key)
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        self.inner.prefix_scan(prefix)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        self.inner.write_batch(ops.clone())?;
        for op in &ops {
            self.record_op(op, Some("batch"))?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<(), StorageError> {
        self.inner.sync()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn test_writes_are_traced_reads_are_not() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("trace").join("store.jsonl");
        let store = TraceStore::new(Arc::new(MemoryStore::new()), &path).unwrap();

        store.put(b"a", b"1").unwrap();
        store.get(b"a").unwrap();
        store.delete(b"a").unwrap();
        store
            .write_batch(vec![BatchOp::put("b", "2")])
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["operation"], "write");
        assert_eq!(lines[0]["key"], hex::encode(b"a"));
        assert_eq!(lines[0]["value"], hex::encode(b"1"));
        assert_eq!(lines[1]["operation"], "delete");
        assert!(lines[1].get("value").is_none());
        assert_eq!(lines[2]["batch"], "batch");
    }

    #[test]
    fn test_appends_across_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store.jsonl");
        let inner: SharedStore = Arc::new(MemoryStore::new());
        TraceStore::new(inner.clone(), &path)
            .unwrap()
            .put(b"x", b"1")
            .unwrap();
        TraceStore::new(inner, &path)
            .unwrap()
            .put(b"y", b"2")
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
