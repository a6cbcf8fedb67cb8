use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use pprof::protos::Message;

use crate::error::NodeError;

/// Sampling frequency of the CPU profiler, in Hz.
const SAMPLE_FREQUENCY: i32 = 99;

/// An open profiling session, finished once on the shutdown path.
pub trait ProfileSession: Send {
    /// Stop sampling and write the artifact. Returns where it was written.
    fn finish(self: Box<Self>) -> Result<PathBuf, NodeError>;
}

/// CPU profile written as a pprof protobuf.
pub struct PprofSession {
    guard: pprof::ProfilerGuard<'static>,
    path: PathBuf,
}

impl PprofSession {
    /// Start sampling. The output file is created up front so a bad path
    /// fails here rather than at shutdown.
    pub fn start(path: &Path) -> Result<Self, NodeError> {
        File::create(path).map_err(|e| NodeError::Profiler {
            reason: format!("cannot create {}: {}", path.display(), e),
        })?;
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(SAMPLE_FREQUENCY)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .map_err(|e| NodeError::Profiler {
                reason: e.to_string(),
            })?;
        tracing::info!(path = %path.display(), "CPU profiling started");
        Ok(Self {
            guard,
            path: path.to_path_buf(),
        })
    }
}

impl ProfileSession for PprofSession {
    fn finish(self: Box<Self>) -> Result<PathBuf, NodeError> {
        let profiler_err = |e: pprof::Error| NodeError::Profiler {
            reason: e.to_string(),
        };
        let report = self.guard.report().build().map_err(profiler_err)?;
        let profile = report.pprof().map_err(profiler_err)?;
        let mut content = Vec::new();
        profile.encode(&mut content).map_err(|e| NodeError::Profiler {
            reason: format!("failed to encode profile: {}", e),
        })?;
        let mut file = File::create(&self.path)?;
        file.write_all(&content)?;
        tracing::info!(path = %self.path.display(), bytes = content.len(), "CPU profile written");
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_path_fails_at_start() {
        let result = PprofSession::start(Path::new("/nonexistent-dir/cpu.pprof"));
        assert!(matches!(result, Err(NodeError::Profiler { .. })));
    }

    #[test]
    fn test_finish_writes_profile() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cpu.pprof");
        let session = PprofSession::start(&path).unwrap();

        let mut acc = 0u64;
        for i in 0..50_000_000u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        std::hint::black_box(acc);

        let written = Box::new(session).finish().unwrap();
        assert_eq!(written, path);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
