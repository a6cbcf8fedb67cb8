//! Single-shot shutdown of a running node.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use vigil_abci::server::SocketServerHandle;

use crate::engine::ConsensusEngine;
use crate::metrics::NodeMetrics;
use crate::node::LifecycleState;
use crate::profiler::ProfileSession;
use crate::sidecar::SidecarHandle;

/// Why the node is going down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(&'static str),
    /// The engine stopped producing blocks, e.g. at a configured halt.
    Halt(String),
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "received {}", name),
            ShutdownReason::Halt(reason) => write!(f, "engine halted: {}", reason),
            ShutdownReason::Requested => f.write_str("shutdown requested"),
        }
    }
}

/// Cloneable handle used by signal handling, the engine and callers to ask for
/// shutdown. Only the first request is acted on.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger(mpsc::UnboundedSender<ShutdownReason>);

impl ShutdownTrigger {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ShutdownReason>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    pub fn request(&self, reason: ShutdownReason) {
        // The receiver is gone only after shutdown already ran.
        let _ = self.0.send(reason);
    }
}

/// Spawn the task that turns SIGINT/SIGTERM into a shutdown request.
pub fn spawn_signal_listener(trigger: ShutdownTrigger) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => {
                tracing::info!(signal = name, "received shutdown signal");
                trigger.request(ShutdownReason::Signal(name));
            }
            Err(e) => tracing::error!("failed to install signal handlers: {}", e),
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// What step (1) of the shutdown stops.
pub enum Primary {
    Engine(Box<dyn ConsensusEngine>),
    /// Standalone mode: the application socket server.
    Socket(SocketServerHandle),
    None,
}

/// Ordered, run-once teardown: primary service, then sidecars, then the
/// profiler, then `Stopped`.
pub struct ShutdownSequence {
    triggered: AtomicBool,
    primary: Mutex<Primary>,
    sidecars: Mutex<Vec<SidecarHandle>>,
    profiler: Mutex<Option<Box<dyn ProfileSession>>>,
    lifecycle: Arc<watch::Sender<LifecycleState>>,
    metrics: Arc<NodeMetrics>,
}

impl ShutdownSequence {
    pub fn new(
        primary: Primary,
        lifecycle: Arc<watch::Sender<LifecycleState>>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            triggered: AtomicBool::new(false),
            primary: Mutex::new(primary),
            sidecars: Mutex::new(Vec::new()),
            profiler: Mutex::new(None),
            lifecycle,
            metrics,
        }
    }

    pub async fn set_profiler(&self, session: Box<dyn ProfileSession>) {
        *self.profiler.lock().await = Some(session);
    }

    pub async fn add_sidecar(&self, handle: SidecarHandle) {
        self.sidecars.lock().await.push(handle);
    }

    /// Run the sequence. Returns `false` without doing anything if it already
    /// ran or is running.
    pub async fn trigger(&self) -> bool {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("shutdown already in progress");
            return false;
        }
        self.publish(LifecycleState::ShuttingDown);
        tracing::info!("shutting down node");

        let primary = std::mem::replace(&mut *self.primary.lock().await, Primary::None);
        match primary {
            Primary::Engine(mut engine) => {
                if engine.is_running() {
                    match engine.stop().await {
                        Ok(()) => tracing::info!("consensus engine stopped"),
                        Err(e) => tracing::error!("failed to stop consensus engine: {}", e),
                    }
                } else {
                    tracing::info!("consensus engine already stopped");
                }
            }
            Primary::Socket(server) => server.stop().await,
            Primary::None => {}
        }

        let sidecars = std::mem::take(&mut *self.sidecars.lock().await);
        for handle in sidecars {
            let name = handle.name();
            if let Err(e) = handle.stop().await {
                tracing::warn!(sidecar = name, "sidecar did not stop cleanly: {}", e);
            }
        }

        if let Some(session) = self.profiler.lock().await.take() {
            if let Err(e) = session.finish() {
                tracing::error!("failed to write CPU profile: {}", e);
            }
        }

        self.publish(LifecycleState::Stopped);
        tracing::info!("node shutdown complete");
        true
    }

    fn publish(&self, state: LifecycleState) {
        self.metrics.lifecycle_state.set(state.ordinal());
        self.lifecycle.send_replace(state);
    }
}
