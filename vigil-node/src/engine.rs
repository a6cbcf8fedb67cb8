//! Consensus engine contract and the built-in single-validator engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vigil_abci::types::{RequestBeginBlock, RequestInitChain, ValidatorUpdate};
use vigil_abci::{AbciError, AppConnection};
use vigil_crypto::keys::EngineKeyExt;
use vigil_crypto::privval::{block_sign_bytes, FilePrivValidator};
use vigil_types::genesis::GenesisDoc;
use vigil_types::primitives::{keccak256, Hash, Height, Timestamp};
use vigil_types::{Address, PublicKey};

use crate::metrics::NodeMetrics;
use crate::shutdown::{ShutdownReason, ShutdownTrigger};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine already started")]
    AlreadyStarted,

    #[error("invalid genesis: {reason}")]
    Genesis { reason: String },

    #[error("app hash after init_chain is {got}, genesis expects {expected}")]
    AppHashMismatch { expected: String, got: String },

    #[error("failed to stop engine: {reason}")]
    Stop { reason: String },

    #[error("application connection: {0}")]
    Abci(#[from] AbciError),
}

/// The consensus engine as seen by the orchestrator.
#[async_trait]
pub trait ConsensusEngine: Send {
    async fn start(&mut self) -> Result<(), EngineError>;
    async fn stop(&mut self) -> Result<(), EngineError>;
    fn is_running(&self) -> bool;
}

/// Everything an engine is built from.
pub struct EngineContext {
    pub connection: Arc<dyn AppConnection>,
    pub signer: FilePrivValidator,
    pub genesis: GenesisDoc,
    pub block_interval: Duration,
    /// Used to report a halt; the orchestrator then runs the shutdown sequence.
    pub halt: ShutdownTrigger,
    pub metrics: Arc<NodeMetrics>,
}

pub trait EngineFactory: Send + Sync {
    fn build(&self, ctx: EngineContext) -> Result<Box<dyn ConsensusEngine>, EngineError>;
}

/// Builds [`SoloEngine`].
#[derive(Debug, Default)]
pub struct SoloEngineFactory;

impl EngineFactory for SoloEngineFactory {
    fn build(&self, ctx: EngineContext) -> Result<Box<dyn ConsensusEngine>, EngineError> {
        Ok(Box::new(SoloEngine::new(ctx)))
    }
}

/// Single-validator engine: proposes, signs and commits one block per interval.
///
/// Any failure to complete a block, including the application refusing to
/// commit at a halt height or time, ends block production and is reported
/// as a halt.
pub struct SoloEngine {
    connection: Arc<dyn AppConnection>,
    signer: Option<FilePrivValidator>,
    genesis: GenesisDoc,
    block_interval: Duration,
    halt: ShutdownTrigger,
    metrics: Arc<NodeMetrics>,
    running: Arc<AtomicBool>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SoloEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            connection: ctx.connection,
            signer: Some(ctx.signer),
            genesis: ctx.genesis,
            block_interval: ctx.block_interval,
            halt: ctx.halt,
            metrics: ctx.metrics,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            task: None,
        }
    }

    async fn init_chain(&self) -> Result<Vec<u8>, EngineError> {
        let time = chrono::DateTime::parse_from_rfc3339(&self.genesis.genesis_time)
            .map_err(|e| EngineError::Genesis {
                reason: format!("genesis_time '{}': {}", self.genesis.genesis_time, e),
            })?
            .timestamp()
            .max(0) as Timestamp;
        let app_state_bytes =
            serde_json::to_vec(&self.genesis.app_state).map_err(|e| EngineError::Genesis {
                reason: format!("app_state: {}", e),
            })?;
        let validators = self
            .genesis
            .validators
            .iter()
            .map(|v| ValidatorUpdate {
                pub_key: v.pub_key,
                power: v.power,
            })
            .collect();

        let res = self
            .connection
            .init_chain(RequestInitChain {
                time,
                chain_id: self.genesis.chain_id.clone(),
                initial_height: self.genesis.initial_height,
                validators,
                app_state_bytes,
            })
            .await?;

        let got = hex::encode(&res.app_hash);
        let expected = vigil_types::primitives::strip_hex_prefix(&self.genesis.app_hash);
        if !expected.is_empty() && !expected.eq_ignore_ascii_case(&got) {
            return Err(EngineError::AppHashMismatch {
                expected: expected.to_string(),
                got,
            });
        }
        Ok(res.app_hash)
    }
}

#[async_trait]
impl ConsensusEngine for SoloEngine {
    async fn start(&mut self) -> Result<(), EngineError> {
        let signer = self.signer.take().ok_or(EngineError::AlreadyStarted)?;
        let own_key = signer.public_key();
        let validator_key = self
            .genesis
            .validators
            .iter()
            .map(|v| v.pub_key)
            .find(|k| *k == own_key)
            .ok_or_else(|| EngineError::Genesis {
                reason: format!(
                    "validator {} is not in the genesis validator set",
                    own_key.address()
                ),
            })?;

        let info = self.connection.info(env!("CARGO_PKG_VERSION")).await?;
        let (next_height, last_app_hash) = if info.last_block_height == 0 {
            let app_hash = self.init_chain().await?;
            (self.genesis.initial_height, app_hash)
        } else {
            (info.last_block_height + 1, info.last_block_app_hash)
        };
        tracing::info!(
            chain_id = %self.genesis.chain_id,
            next_height,
            interval_ms = self.block_interval.as_millis() as u64,
            "solo engine starting"
        );

        let producer = BlockProducer {
            proposer: validator_key.address(),
            validator_key,
            signer,
            connection: self.connection.clone(),
            metrics: self.metrics.clone(),
            next_height,
            last_app_hash,
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        self.running.store(true, Ordering::SeqCst);
        self.task = Some(tokio::spawn(run_blocks(
            producer,
            self.block_interval,
            stop_rx,
            self.running.clone(),
            self.halt.clone(),
        )));
        self.stop_tx = Some(stop_tx);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| EngineError::Stop {
                reason: e.to_string(),
            })?;
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct BlockProducer {
    signer: FilePrivValidator,
    /// Genesis key every produced signature must verify under.
    validator_key: PublicKey,
    proposer: Address,
    connection: Arc<dyn AppConnection>,
    metrics: Arc<NodeMetrics>,
    next_height: Height,
    last_app_hash: Vec<u8>,
}

impl BlockProducer {
    /// Propose, sign and commit the next block. The error is the halt reason.
    async fn produce(&mut self) -> Result<(), String> {
        let height = self.next_height;
        let time = chrono::Utc::now().timestamp().max(0) as Timestamp;

        // A height signed before a restart is proposed again in a later round.
        let last = self.signer.last_sign_state();
        let round = if last.height == height {
            last.round + 1
        } else {
            0
        };
        let hash = block_hash(&self.last_app_hash, height, round, time);
        let signature = self
            .signer
            .sign_block(height, round, &hash)
            .map_err(|e| format!("cannot sign block {}: {}", height, e))?;
        self.validator_key
            .engine_key()
            .verify(&block_sign_bytes(height, round, &hash), &signature)
            .map_err(|e| format!("signature for block {} rejected: {}", height, e))?;

        self.connection
            .begin_block(RequestBeginBlock {
                height,
                time,
                hash,
                proposer: self.proposer,
            })
            .await
            .map_err(|e| format!("begin_block {} failed: {}", height, e))?;
        let end = self
            .connection
            .end_block(height)
            .await
            .map_err(|e| format!("end_block {} failed: {}", height, e))?;
        let commit = self
            .connection
            .commit()
            .await
            .map_err(|e| format!("commit refused at height {}: {}", height, e))?;

        if !end.validator_updates.is_empty() {
            tracing::info!(height, updates = end.validator_updates.len(), "validator set updated");
        }
        tracing::info!(height, round, app_hash = %hex::encode(&commit.data), "committed block");
        self.metrics.blocks_committed.inc();
        self.metrics.app_height.set(height as i64);
        self.last_app_hash = commit.data;
        self.next_height = height + 1;
        Ok(())
    }
}

fn block_hash(prev_app_hash: &[u8], height: Height, round: u32, time: Timestamp) -> Hash {
    let mut preimage = Vec::with_capacity(prev_app_hash.len() + 20);
    preimage.extend_from_slice(prev_app_hash);
    preimage.extend_from_slice(&height.to_be_bytes());
    preimage.extend_from_slice(&round.to_be_bytes());
    preimage.extend_from_slice(&time.to_be_bytes());
    keccak256(&preimage)
}

async fn run_blocks(
    mut producer: BlockProducer,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    running: Arc<AtomicBool>,
    halt: ShutdownTrigger,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                if let Err(reason) = producer.produce().await {
                    tracing::warn!("block production halted: {}", reason);
                    running.store(false, Ordering::SeqCst);
                    halt.request(ShutdownReason::Halt(reason));
                    return;
                }
            }
        }
    }
    running.store(false, Ordering::SeqCst);
    tracing::info!(next_height = producer.next_height, "solo engine stopped");
}

#[cfg(test)]
mod tests {
    use tokio::sync::Mutex;

    use super::*;
    use crate::config::{Configuration, HomeDir};
    use vigil_abci::LocalClient;
    use vigil_app::{ModuleRegistry, VigilApp};
    use vigil_storage::memory::MemoryStore;
    use vigil_storage::SharedStore;

    type EngineParts = (
        SoloEngine,
        Arc<Mutex<VigilApp>>,
        tokio::sync::mpsc::UnboundedReceiver<ShutdownReason>,
    );

    struct Fixture {
        _tmp: tempfile::TempDir,
        home: HomeDir,
        store: SharedStore,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let home = HomeDir::new(tmp.path());
            home.ensure().unwrap();
            Self {
                _tmp: tmp,
                home,
                store: Arc::new(MemoryStore::new()),
            }
        }

        fn engine(&self, halt_height: u64) -> EngineParts {
            let mut config = Configuration::default();
            config.app.halt_height = halt_height;
            let app = crate::app_factory::build_application(&config, self.store.clone()).unwrap();
            let app = Arc::new(Mutex::new(app));
            let signer = FilePrivValidator::load_or_generate(
                &self.home.priv_validator_key_file(),
                &self.home.priv_validator_state_file(),
            )
            .unwrap();
            let genesis = crate::genesis::load_or_create(
                &self.home,
                "vigil-test",
                &signer.public_key(),
                &ModuleRegistry::with_default_modules(),
            )
            .unwrap();
            let (halt, halt_rx) = ShutdownTrigger::channel();
            let engine = SoloEngine::new(EngineContext {
                connection: Arc::new(LocalClient::from_shared(app.clone())),
                signer,
                genesis,
                block_interval: Duration::from_millis(10),
                halt,
                metrics: Arc::new(NodeMetrics::new()),
            });
            (engine, app, halt_rx)
        }
    }

    async fn wait_for_height(app: &Arc<Mutex<VigilApp>>, height: u64) {
        for _ in 0..500 {
            if app.lock().await.last_height() >= height {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("height {} not reached", height);
    }

    #[tokio::test]
    async fn test_produces_and_stops() {
        let fixture = Fixture::new();
        let (mut engine, app, _halt_rx) = fixture.engine(0);
        engine.start().await.unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.start().await, Err(EngineError::AlreadyStarted)));

        wait_for_height(&app, 3).await;
        engine.stop().await.unwrap();
        assert!(!engine.is_running());
        assert_eq!(app.lock().await.chain_id(), "vigil-test");
    }

    #[tokio::test]
    async fn test_halt_height_reported_as_halt() {
        let fixture = Fixture::new();
        let (mut engine, app, mut halt_rx) = fixture.engine(3);
        engine.start().await.unwrap();

        let reason = tokio::time::timeout(Duration::from_secs(5), halt_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match reason {
            ShutdownReason::Halt(msg) => assert!(msg.contains("halt height 3 reached"), "{}", msg),
            other => panic!("unexpected reason: {}", other),
        }
        assert!(!engine.is_running());
        assert_eq!(app.lock().await.last_height(), 2);
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_resumes_after_halt_in_new_round() {
        let fixture = Fixture::new();
        let (mut engine, _app, mut halt_rx) = fixture.engine(2);
        engine.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), halt_rx.recv())
            .await
            .unwrap()
            .unwrap();
        engine.stop().await.unwrap();

        // Height 2 was signed but never committed.
        let (mut engine, app, _halt_rx) = fixture.engine(0);
        engine.start().await.unwrap();
        wait_for_height(&app, 3).await;
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_validator_key_is_refused_at_start() {
        let fixture = Fixture::new();
        let (mut engine, _app, _halt_rx) = fixture.engine(0);
        let stranger = vigil_crypto::keys::PrivateKey::generate().public_key();
        engine.genesis.validators[0].pub_key = stranger;
        assert!(matches!(engine.start().await, Err(EngineError::Genesis { .. })));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_signature_under_wrong_key_halts_production() {
        let fixture = Fixture::new();
        let (engine, app, _halt_rx) = fixture.engine(0);
        let signer = FilePrivValidator::load_or_generate(
            &fixture.home.priv_validator_key_file(),
            &fixture.home.priv_validator_state_file(),
        )
        .unwrap();
        let last_app_hash = engine.init_chain().await.unwrap();
        let validator_key = signer.public_key();
        let mut producer = BlockProducer {
            proposer: validator_key.address(),
            validator_key,
            signer,
            connection: engine.connection.clone(),
            metrics: Arc::new(NodeMetrics::new()),
            next_height: engine.genesis.initial_height,
            last_app_hash,
        };

        producer.produce().await.unwrap();
        let committed = app.lock().await.last_height();
        assert_eq!(committed, engine.genesis.initial_height);

        producer.validator_key = vigil_crypto::keys::PrivateKey::generate().public_key();
        let reason = producer.produce().await.unwrap_err();
        assert!(reason.contains("rejected"), "{}", reason);
        assert_eq!(app.lock().await.last_height(), committed);
    }

    #[test]
    fn test_block_hash_depends_on_round() {
        let a = block_hash(&[1u8; 32], 5, 0, 100);
        let b = block_hash(&[1u8; 32], 5, 1, 100);
        assert_ne!(a, b);
        assert_eq!(a, block_hash(&[1u8; 32], 5, 0, 100));
    }
}
