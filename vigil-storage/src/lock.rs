use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::StorageError;

/// Exclusive advisory lock on a data directory, held for the life of the value.
///
/// The lock file (`<dir>/LOCK`) carries the holder's PID so a second process
/// can report who owns the directory.
#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    pub const FILE_NAME: &'static str = "LOCK";

    /// Take the lock without blocking. Fails with [`StorageError::Locked`] if
    /// another holder exists.
    pub fn acquire(dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            let mut contents = String::new();
            let pid = file
                .read_to_string(&mut contents)
                .ok()
                .and_then(|_| contents.trim().parse().ok());
            return Err(StorageError::Locked { path, pid });
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;

        tracing::debug!(path = %path.display(), "acquired data directory lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), "failed to release data directory lock: {}", e);
        }
    }
}
