//! Auxiliary services started next to the consensus engine.
//!
//! A sidecar runs on its own task until told to stop. Startup may block on a
//! one-shot readiness handshake: the sidecar holds a [`ReadySignal`] and fires
//! it once it is serving, while the orchestrator waits on the matching
//! [`ReadyWaiter`] with a bounded timeout.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// How long `stop` waits for a sidecar task to finish before aborting it.
const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("{name} did not become ready within {timeout_secs}s")]
    StartTimeout { name: String, timeout_secs: u64 },

    #[error("{name} exited before becoming ready")]
    ExitedBeforeReady { name: String },

    #[error("{name} failed to bind {addr}: {reason}")]
    Bind {
        name: String,
        addr: String,
        reason: String,
    },

    #[error("{name} failed: {reason}")]
    Failed { name: String, reason: String },

    #[error("{name} task ended abnormally: {reason}")]
    Join { name: String, reason: String },
}

/// Sending half of the readiness handshake. Consumed by [`ReadySignal::signal`].
#[derive(Debug)]
pub struct ReadySignal(oneshot::Sender<()>);

impl ReadySignal {
    pub fn signal(self) {
        // The waiter may have given up already.
        let _ = self.0.send(());
    }
}

/// Receiving half of the readiness handshake. Consumed by [`ReadyWaiter::wait`].
#[derive(Debug)]
pub struct ReadyWaiter {
    name: &'static str,
    rx: oneshot::Receiver<()>,
}

impl ReadyWaiter {
    pub async fn wait(self, timeout: Duration) -> Result<(), SidecarError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SidecarError::ExitedBeforeReady {
                name: self.name.to_string(),
            }),
            Err(_) => Err(SidecarError::StartTimeout {
                name: self.name.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

pub fn ready_pair(name: &'static str) -> (ReadySignal, ReadyWaiter) {
    let (tx, rx) = oneshot::channel();
    (ReadySignal(tx), ReadyWaiter { name, rx })
}

/// Fires once when the sidecar should shut down.
#[derive(Debug, Clone)]
pub struct StopToken(watch::Receiver<bool>);

impl StopToken {
    pub async fn stopped(&mut self) {
        // A dropped sender means the owner is gone; stop as well.
        let _ = self.0.wait_for(|stop| *stop).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

/// A service run alongside the engine.
#[async_trait]
pub trait Sidecar: Send + 'static {
    fn name(&self) -> &'static str;

    /// Serve until `stop` fires. Call `ready.signal()` once serving.
    async fn start(self: Box<Self>, ready: ReadySignal, stop: StopToken)
        -> Result<(), SidecarError>;
}

/// A started sidecar.
pub struct SidecarHandle {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Result<(), SidecarError>>,
}

impl SidecarHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the sidecar to stop and wait for it, aborting after a grace period.
    pub async fn stop(mut self) -> Result<(), SidecarError> {
        let _ = self.stop_tx.send(true);
        match tokio::time::timeout(STOP_GRACE, &mut self.task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(SidecarError::Join {
                name: self.name.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => {
                self.task.abort();
                Err(SidecarError::Join {
                    name: self.name.to_string(),
                    reason: format!("did not stop within {}s, aborted", STOP_GRACE.as_secs()),
                })
            }
        }
    }
}

impl std::fmt::Debug for SidecarHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Spawn `sidecar` on its own task. Errors it returns are logged when it ends.
pub fn spawn(sidecar: Box<dyn Sidecar>) -> (SidecarHandle, ReadyWaiter) {
    let name = sidecar.name();
    let (ready, waiter) = ready_pair(name);
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let result = sidecar.start(ready, StopToken(stop_rx)).await;
        match &result {
            Ok(()) => tracing::info!(sidecar = name, "sidecar stopped"),
            Err(e) => tracing::error!(sidecar = name, "sidecar failed: {}", e),
        }
        result
    });
    tracing::info!(sidecar = name, "sidecar spawned");
    (
        SidecarHandle {
            name,
            stop_tx,
            task,
        },
        waiter,
    )
}
