//! Node lifecycle orchestration.
//!
//! `Unstarted -> Initializing -> Running -> ShuttingDown -> Stopped`, published
//! on a watch channel. Startup opens storage, builds the application, loads the
//! validator identity, binds the transport and starts the engine; sidecars come
//! after a successful engine start, the query server first. A signal or an
//! engine halt runs the single-shot [`ShutdownSequence`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use vigil_abci::AppConnection;
use vigil_app::{ModuleRegistry, VigilApp};
use vigil_storage::{open_store, OpenedStore};

use crate::app_factory::build_application;
use crate::config::{Configuration, HomeDir};
use crate::engine::{EngineContext, EngineFactory, SoloEngineFactory};
use crate::error::NodeError;
use crate::identity::ValidatorIdentity;
use crate::metrics::NodeMetrics;
use crate::profiler::PprofSession;
use crate::relay::RelaySidecar;
use crate::rpc::handlers::RpcContext;
use crate::rpc::QueryServer;
use crate::shutdown::{
    spawn_signal_listener, Primary, ShutdownReason, ShutdownSequence, ShutdownTrigger,
};
use crate::sidecar::{self, Sidecar};
use crate::transport::{self, Binding};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    pub fn ordinal(self) -> i64 {
        match self {
            LifecycleState::Unstarted => 0,
            LifecycleState::Initializing => 1,
            LifecycleState::Running => 2,
            LifecycleState::ShuttingDown => 3,
            LifecycleState::Stopped => 4,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A node that has not started yet.
pub struct Node {
    config: Configuration,
    home: HomeDir,
    metrics: Arc<NodeMetrics>,
    lifecycle: Arc<watch::Sender<LifecycleState>>,
    engine_factory: Box<dyn EngineFactory>,
    query_sidecar: Option<Box<dyn Sidecar>>,
}

impl Node {
    pub fn new(config: Configuration, home: HomeDir) -> Self {
        let (lifecycle, _) = watch::channel(LifecycleState::Unstarted);
        Self {
            config,
            home,
            metrics: Arc::new(NodeMetrics::new()),
            lifecycle: Arc::new(lifecycle),
            engine_factory: Box::new(SoloEngineFactory),
            query_sidecar: None,
        }
    }

    /// Plug in a different consensus engine.
    pub fn with_engine_factory(mut self, factory: impl EngineFactory + 'static) -> Self {
        self.engine_factory = Box::new(factory);
        self
    }

    /// Replace the built-in query server (still subject to `query_server.enabled`).
    pub fn with_query_sidecar(mut self, sidecar: Box<dyn Sidecar>) -> Self {
        self.query_sidecar = Some(sidecar);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }

    pub fn metrics(&self) -> Arc<NodeMetrics> {
        self.metrics.clone()
    }

    fn publish(&self, state: LifecycleState) {
        publish(&self.lifecycle, &self.metrics, state);
    }

    /// Start the node. On error nothing is left running and the state is `Stopped`.
    pub async fn start(self) -> Result<RunningNode, NodeError> {
        let lifecycle = self.lifecycle.clone();
        let metrics = self.metrics.clone();
        self.publish(LifecycleState::Initializing);
        match self.start_inner().await {
            Ok(running) => {
                publish(&lifecycle, &metrics, LifecycleState::Running);
                tracing::info!("node running");
                Ok(running)
            }
            Err(e) => {
                publish(&lifecycle, &metrics, LifecycleState::Stopped);
                Err(e)
            }
        }
    }

    /// Start, then block until shutdown has completed.
    pub async fn run(self) -> Result<ShutdownReason, NodeError> {
        let running = self.start().await?;
        Ok(running.wait().await)
    }

    async fn start_inner(mut self) -> Result<RunningNode, NodeError> {
        let config = self.config.clone();
        config.validate()?;
        self.home.ensure()?;

        let data_dir = config.store_dir(&self.home);
        std::fs::create_dir_all(&data_dir)?;
        let trace_path = config.storage.trace_store.as_deref().map(|p| self.home.resolve(p));
        let store = open_store(&data_dir, config.backend()?, trace_path.as_deref())?;

        let app = build_application(&config, store.store.clone())?;
        self.metrics.app_height.set(app.last_height() as i64);
        let app = Arc::new(Mutex::new(app));

        let identity = if config.engine.embedded {
            Some(ValidatorIdentity::load_or_generate(&self.home)?)
        } else {
            None
        };

        let (trigger, reasons) = ShutdownTrigger::channel();
        let binding = transport::bind(&config, app.clone()).await?;
        let (client, identity) = match (binding, identity) {
            (Binding::Embedded(client), Some(identity)) => (client, identity),
            (Binding::Standalone(server), _) => {
                let socket_addr = server.local_addr();
                let sequence = Arc::new(ShutdownSequence::new(
                    Primary::Socket(server),
                    self.lifecycle.clone(),
                    self.metrics.clone(),
                ));
                self.open_profiler(&sequence).await?;
                let signal_task = spawn_signal_listener(trigger.clone());
                tracing::info!(addr = %socket_addr, "waiting for external consensus engine");
                return Ok(RunningNode {
                    lifecycle: self.lifecycle.subscribe(),
                    sequence,
                    trigger,
                    reasons,
                    signal_task,
                    query_addr: None,
                    socket_addr: Some(socket_addr),
                    app,
                    _store: store,
                });
            }
            (Binding::Embedded(_), None) => {
                return Err(NodeError::ConfigError {
                    reason: "embedded binding without a validator identity".to_string(),
                })
            }
        };

        let registry = ModuleRegistry::with_default_modules();
        let chain_id = crate::genesis::default_chain_id(&identity.node_id());
        let genesis = crate::genesis::load_or_create(
            &self.home,
            &chain_id,
            &identity.public_key(),
            &registry,
        )?;
        let query_listen_addr = if config.query_server.enabled {
            Some(config.query_listen_addr()?)
        } else {
            None
        };
        let relay_targets = config.relay_targets()?;

        let node_id = identity.node_id();
        let pub_key = identity.public_key();
        let connection: Arc<dyn AppConnection> = Arc::new(client);
        let mut engine = self
            .engine_factory
            .build(EngineContext {
                connection: connection.clone(),
                signer: identity.into_signer(),
                genesis: genesis.clone(),
                block_interval: Duration::from_millis(config.engine.block_interval_ms),
                halt: trigger.clone(),
                metrics: self.metrics.clone(),
            })
            .map_err(|e| NodeError::EngineStartError {
                reason: e.to_string(),
            })?;
        if let Err(e) = engine.start().await {
            tracing::error!("consensus engine failed to start: {}", e);
            return Err(NodeError::EngineStartError {
                reason: e.to_string(),
            });
        }
        tracing::info!(node_id = %node_id, chain_id = %genesis.chain_id, "consensus engine started");

        let sequence = Arc::new(ShutdownSequence::new(
            Primary::Engine(engine),
            self.lifecycle.clone(),
            self.metrics.clone(),
        ));
        self.open_profiler(&sequence).await?;
        let signal_task = spawn_signal_listener(trigger.clone());

        let mut query_addr = None;
        if let Some(listen_addr) = query_listen_addr {
            let sidecar: Box<dyn Sidecar> = match self.query_sidecar.take() {
                Some(custom) => custom,
                None => {
                    let server = QueryServer::new(
                        listen_addr,
                        RpcContext {
                            connection: connection.clone(),
                            node_id: node_id.to_string(),
                            chain_id: genesis.chain_id.clone(),
                            pub_key,
                            embedded_engine: true,
                            metrics: self.metrics.clone(),
                            lifecycle: self.lifecycle.subscribe(),
                        },
                    );
                    query_addr = Some(server.bound_addr());
                    Box::new(server)
                }
            };
            let (handle, waiter) = sidecar::spawn(sidecar);
            sequence.add_sidecar(handle).await;
            self.metrics.sidecars_started.inc();
            let timeout = Duration::from_secs(config.query_server.ready_timeout_secs);
            match waiter.wait(timeout).await {
                Ok(()) => tracing::info!("query server ready"),
                Err(e) => tracing::warn!("continuing without a ready query server: {}", e),
            }
        }

        if config.relay.enabled {
            let relay = RelaySidecar::new(
                &relay_targets,
                &config.relay.root_rpc_url,
                &config.relay.side_rpc_url,
                Duration::from_secs(config.relay.poll_interval_secs),
            );
            let (handle, _) = sidecar::spawn(Box::new(relay));
            sequence.add_sidecar(handle).await;
            self.metrics.sidecars_started.inc();
        }

        Ok(RunningNode {
            lifecycle: self.lifecycle.subscribe(),
            sequence,
            trigger,
            reasons,
            signal_task,
            query_addr,
            socket_addr: None,
            app,
            _store: store,
        })
    }

    /// Open the CPU profile if configured. A failure tears down what already
    /// started and is returned.
    async fn open_profiler(&self, sequence: &ShutdownSequence) -> Result<(), NodeError> {
        let Some(path) = self.config.profiling.cpu_profile.as_deref() else {
            return Ok(());
        };
        match PprofSession::start(&self.home.resolve(path)) {
            Ok(session) => {
                sequence.set_profiler(Box::new(session)).await;
                Ok(())
            }
            Err(e) => {
                tracing::error!("failed to start CPU profile: {}", e);
                sequence.trigger().await;
                Err(e)
            }
        }
    }
}

fn publish(
    lifecycle: &watch::Sender<LifecycleState>,
    metrics: &NodeMetrics,
    state: LifecycleState,
) {
    metrics.lifecycle_state.set(state.ordinal());
    lifecycle.send_replace(state);
}

/// A started node. Dropping it without [`RunningNode::wait`] leaves the
/// services running until the runtime shuts down.
pub struct RunningNode {
    lifecycle: watch::Receiver<LifecycleState>,
    sequence: Arc<ShutdownSequence>,
    trigger: ShutdownTrigger,
    reasons: mpsc::UnboundedReceiver<ShutdownReason>,
    signal_task: JoinHandle<()>,
    query_addr: Option<Arc<OnceLock<SocketAddr>>>,
    socket_addr: Option<SocketAddr>,
    app: Arc<Mutex<VigilApp>>,
    _store: OpenedStore,
}

impl RunningNode {
    pub fn state(&self) -> LifecycleState {
        *self.lifecycle.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.clone()
    }

    /// Handle for requesting shutdown from elsewhere in the process.
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Address the built-in query server is listening on.
    pub fn query_addr(&self) -> Option<SocketAddr> {
        self.query_addr.as_ref().and_then(|a| a.get().copied())
    }

    /// Address of the application socket in standalone mode.
    pub fn app_socket_addr(&self) -> Option<SocketAddr> {
        self.socket_addr
    }

    pub fn app(&self) -> Arc<Mutex<VigilApp>> {
        self.app.clone()
    }

    /// Block until a signal, a halt or a shutdown request, then run the
    /// shutdown sequence to completion.
    pub async fn wait(mut self) -> ShutdownReason {
        let reason = self
            .reasons
            .recv()
            .await
            .unwrap_or(ShutdownReason::Requested);
        match &reason {
            ShutdownReason::Halt(msg) => tracing::warn!("node halting: {}", msg),
            other => tracing::info!(reason = %other, "shutdown triggered"),
        }
        self.signal_task.abort();
        self.sequence.trigger().await;
        reason
    }
}
