//! Storage for the Vigil node.
//!
//! The application sees a single [`KvStore`](traits::KvStore) handle. Behind it
//! sit an in-memory or SQLite backend, an optional [`TraceStore`](trace::TraceStore)
//! that records every write, and a [`DataDirLock`](lock::DataDirLock) that keeps
//! two processes off the same data directory.

pub mod error;
pub mod lock;
pub mod memory;
pub mod open;
pub mod sqlite;
pub mod trace;
pub mod traits;

pub use error::StorageError;
pub use open::{open_store, Backend, OpenedStore};
pub use traits::{BatchOp, KvStore, SharedStore};
