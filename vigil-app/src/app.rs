use borsh::{BorshDeserialize, BorshSerialize};
use vigil_abci::types::{
    RequestBeginBlock, RequestInitChain, RequestQuery, ResponseCommit, ResponseDeliverTx,
    ResponseEndBlock, ResponseInfo, ResponseInitChain, ResponseQuery,
};
use vigil_abci::{AbciError, Application};
use vigil_storage::{BatchOp, KvStore, SharedStore};
use vigil_types::primitives::{keccak256, Hash, Height, Timestamp};

use crate::error::AppError;
use crate::genesis::{AppGenesisState, ModuleRegistry};
use crate::options::AppOptions;

/// Application name reported by `Info`.
pub const APP_NAME: &str = "vigil";

const KEY_CHAIN_ID: &[u8] = b"meta/chain_id";
const KEY_LAST_HEIGHT: &[u8] = b"meta/last_height";
const KEY_LAST_APP_HASH: &[u8] = b"meta/last_app_hash";
const KEY_APP_STATE: &[u8] = b"genesis/app_state";
const SNAPSHOT_PREFIX: &[u8] = b"snapshot/";

/// Query result codes.
pub const CODE_OK: u32 = 0;
pub const CODE_UNKNOWN_PATH: u32 = 1;
pub const CODE_NOT_FOUND: u32 = 2;
pub const CODE_BAD_REQUEST: u32 = 3;

/// Per-height record written on every commit.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CommitSnapshot {
    pub height: Height,
    pub time: Timestamp,
    pub app_hash: Hash,
    pub tx_count: u32,
}

fn snapshot_key(height: Height) -> Vec<u8> {
    let mut key = SNAPSHOT_PREFIX.to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    key
}

struct PendingBlock {
    height: Height,
    time: Timestamp,
    tx_hashes: Vec<Hash>,
}

/// The sidechain application.
///
/// State is a hash chain over committed blocks plus the genesis app state, kept
/// in the shared store. Business modules contribute genesis verification only.
pub struct VigilApp {
    store: SharedStore,
    options: AppOptions,
    registry: ModuleRegistry,
    chain_id: String,
    last_height: Height,
    last_app_hash: Hash,
    pending: Option<PendingBlock>,
}

impl VigilApp {
    /// Build the application over `store`, resuming from any committed state.
    pub fn new(
        store: SharedStore,
        options: AppOptions,
        registry: ModuleRegistry,
    ) -> Result<Self, AppError> {
        let chain_id = match store.get(KEY_CHAIN_ID)? {
            Some(bytes) => String::from_utf8(bytes).map_err(|e| AppError::CorruptState {
                reason: format!("chain id: {}", e),
            })?,
            None => String::new(),
        };
        let last_height = match store.get(KEY_LAST_HEIGHT)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    AppError::CorruptState {
                        reason: format!("last height is {} bytes", bytes.len()),
                    }
                })?;
                u64::from_be_bytes(raw)
            }
            None => 0,
        };
        let last_app_hash = match store.get(KEY_LAST_APP_HASH)? {
            Some(bytes) => bytes.as_slice().try_into().map_err(|_| AppError::CorruptState {
                reason: format!("last app hash is {} bytes", bytes.len()),
            })?,
            None => [0u8; 32],
        };

        tracing::info!(
            pruning = %options.pruning,
            halt_height = ?options.halt_height,
            halt_time = ?options.halt_time,
            last_height,
            "application loaded"
        );
        Ok(Self {
            store,
            options,
            registry,
            chain_id,
            last_height,
            last_app_hash,
            pending: None,
        })
    }

    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn last_height(&self) -> Height {
        self.last_height
    }

    pub fn last_app_hash(&self) -> Hash {
        self.last_app_hash
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn snapshot(&self, height: Height) -> Result<Option<CommitSnapshot>, AppError> {
        match self.store.get(&snapshot_key(height))? {
            Some(bytes) => CommitSnapshot::try_from_slice(&bytes)
                .map(Some)
                .map_err(|e| AppError::CorruptState {
                    reason: format!("snapshot {}: {}", height, e),
                }),
            None => Ok(None),
        }
    }

    fn halt_reason(&self, height: Height, time: Timestamp) -> Option<String> {
        if let Some(halt_height) = self.options.halt_height {
            if height >= halt_height {
                return Some(format!("halt height {} reached", halt_height));
            }
        }
        if let Some(halt_time) = self.options.halt_time {
            if time >= halt_time {
                return Some(format!("halt time {} reached", halt_time));
            }
        }
        None
    }

    fn do_init_chain(&mut self, req: RequestInitChain) -> Result<ResponseInitChain, AppError> {
        let state = AppGenesisState::from_bytes(&req.app_state_bytes).map_err(|error| {
            crate::genesis::GenesisFailure {
                module: "app_state".to_string(),
                error,
            }
        })?;
        self.registry.verify_genesis(&state)?;

        let app_hash = keccak256(&state.to_bytes());
        let base_height = req.initial_height.saturating_sub(1);
        self.store.write_batch(vec![
            BatchOp::put(KEY_CHAIN_ID, req.chain_id.as_bytes()),
            BatchOp::put(KEY_APP_STATE, state.to_bytes()),
            BatchOp::put(KEY_LAST_HEIGHT, base_height.to_be_bytes().to_vec()),
            BatchOp::put(KEY_LAST_APP_HASH, app_hash.to_vec()),
        ])?;
        self.chain_id = req.chain_id;
        self.last_height = base_height;
        self.last_app_hash = app_hash;

        tracing::info!(
            chain_id = %self.chain_id,
            initial_height = req.initial_height,
            validators = req.validators.len(),
            "chain initialized"
        );
        Ok(ResponseInitChain {
            validators: req.validators,
            app_hash: app_hash.to_vec(),
        })
    }

    fn do_begin_block(&mut self, req: RequestBeginBlock) -> Result<(), AppError> {
        let expected = self.last_height + 1;
        if req.height != expected {
            return Err(AppError::InvalidRequest {
                reason: format!("begin_block at height {}, expected {}", req.height, expected),
            });
        }
        self.pending = Some(PendingBlock {
            height: req.height,
            time: req.time,
            tx_hashes: Vec::new(),
        });
        Ok(())
    }

    fn do_commit(&mut self) -> Result<ResponseCommit, AppError> {
        let block = self.pending.take().ok_or_else(|| AppError::InvalidRequest {
            reason: "commit without begin_block".to_string(),
        })?;
        if let Some(reason) = self.halt_reason(block.height, block.time) {
            tracing::warn!(height = block.height, "{}; refusing to commit", reason);
            return Err(AppError::Halted {
                height: block.height,
                reason,
            });
        }

        let mut preimage = Vec::with_capacity(32 + 8 + 32 * block.tx_hashes.len());
        preimage.extend_from_slice(&self.last_app_hash);
        preimage.extend_from_slice(&block.height.to_be_bytes());
        for tx in &block.tx_hashes {
            preimage.extend_from_slice(tx);
        }
        let app_hash = keccak256(&preimage);

        let snapshot = CommitSnapshot {
            height: block.height,
            time: block.time,
            app_hash,
            tx_count: block.tx_hashes.len() as u32,
        };
        let encoded = borsh::to_vec(&snapshot).map_err(|e| AppError::CorruptState {
            reason: e.to_string(),
        })?;
        let mut ops = vec![
            BatchOp::put(snapshot_key(block.height), encoded),
            BatchOp::put(KEY_LAST_HEIGHT, block.height.to_be_bytes().to_vec()),
            BatchOp::put(KEY_LAST_APP_HASH, app_hash.to_vec()),
        ];
        if let Some(pruned) = self.options.pruning.prune_after_commit(block.height) {
            ops.push(BatchOp::delete(snapshot_key(pruned)));
        }
        self.store.write_batch(ops)?;

        self.last_height = block.height;
        self.last_app_hash = app_hash;
        tracing::debug!(height = block.height, app_hash = %hex::encode(app_hash), "committed");
        Ok(ResponseCommit {
            data: app_hash.to_vec(),
            retain_height: 0,
        })
    }

    fn query_response(&self, req: RequestQuery) -> Result<ResponseQuery, AppError> {
        let ok = |key: Vec<u8>, value: Vec<u8>| ResponseQuery {
            code: CODE_OK,
            log: String::new(),
            key,
            value,
            height: self.last_height,
        };
        let fail = |code: u32, log: String| ResponseQuery {
            code,
            log,
            height: self.last_height,
            ..Default::default()
        };
        let res = match req.path.as_str() {
            "app/height" => ok(vec![], self.last_height.to_string().into_bytes()),
            "app/hash" => ok(vec![], hex::encode(self.last_app_hash).into_bytes()),
            "app/chain_id" => ok(vec![], self.chain_id.clone().into_bytes()),
            "app/min_gas_prices" => ok(vec![], self.options.min_gas_prices.to_string().into_bytes()),
            "app/genesis" => match self.store.get(KEY_APP_STATE)? {
                Some(bytes) => ok(KEY_APP_STATE.to_vec(), bytes),
                None => fail(CODE_NOT_FOUND, "chain not initialized".to_string()),
            },
            "store/key" => match self.store.get(&req.data)? {
                Some(value) => ok(req.data, value),
                None => fail(CODE_NOT_FOUND, "key not found".to_string()),
            },
            "snapshot" => {
                let height = if req.height == 0 {
                    self.last_height
                } else {
                    req.height
                };
                match self.snapshot(height)? {
                    Some(s) => {
                        let value = borsh::to_vec(&s).map_err(|e| AppError::CorruptState {
                            reason: e.to_string(),
                        })?;
                        ok(snapshot_key(height), value)
                    }
                    None => fail(
                        CODE_NOT_FOUND,
                        format!("no snapshot at height {} (pruned or not committed)", height),
                    ),
                }
            }
            other => fail(CODE_UNKNOWN_PATH, format!("unknown query path '{}'", other)),
        };
        Ok(res)
    }
}

impl Application for VigilApp {
    fn info(&self, version: &str) -> ResponseInfo {
        ResponseInfo {
            data: APP_NAME.to_string(),
            version: version.to_string(),
            last_block_height: self.last_height,
            last_block_app_hash: if self.last_height == 0 {
                Vec::new()
            } else {
                self.last_app_hash.to_vec()
            },
        }
    }

    fn init_chain(&mut self, req: RequestInitChain) -> Result<ResponseInitChain, AbciError> {
        Ok(self.do_init_chain(req)?)
    }

    fn begin_block(&mut self, req: RequestBeginBlock) -> Result<(), AbciError> {
        Ok(self.do_begin_block(req)?)
    }

    fn deliver_tx(&mut self, tx: &[u8]) -> ResponseDeliverTx {
        match self.pending.as_mut() {
            Some(block) => {
                block.tx_hashes.push(keccak256(tx));
                ResponseDeliverTx::default()
            }
            None => ResponseDeliverTx {
                code: CODE_BAD_REQUEST,
                log: "deliver_tx outside a block".to_string(),
            },
        }
    }

    fn end_block(&mut self, height: u64) -> Result<ResponseEndBlock, AbciError> {
        match &self.pending {
            Some(block) if block.height == height => Ok(ResponseEndBlock::default()),
            _ => Err(AppError::InvalidRequest {
                reason: format!("end_block at height {} without matching begin_block", height),
            }
            .into()),
        }
    }

    fn commit(&mut self) -> Result<ResponseCommit, AbciError> {
        Ok(self.do_commit()?)
    }

    fn query(&self, req: RequestQuery) -> ResponseQuery {
        let height = self.last_height;
        self.query_response(req).unwrap_or_else(|e| ResponseQuery {
            code: CODE_BAD_REQUEST,
            log: e.to_string(),
            height,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::genesis::ModuleRegistry;
    use crate::pruning::PruningStrategy;
    use vigil_abci::types::{Request, Response};
    use vigil_abci::dispatch;
    use vigil_storage::memory::MemoryStore;
    use vigil_types::Address;

    fn make_app(options: AppOptions) -> (VigilApp, SharedStore) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let app = VigilApp::new(store.clone(), options, ModuleRegistry::with_default_modules())
            .unwrap();
        (app, store)
    }

    fn init(app: &mut VigilApp) {
        let state = ModuleRegistry::with_default_modules().default_genesis();
        app.init_chain(RequestInitChain {
            time: 0,
            chain_id: "vigil-test".to_string(),
            initial_height: 1,
            validators: vec![],
            app_state_bytes: state.to_bytes(),
        })
        .unwrap();
    }

    fn run_block(app: &mut VigilApp, height: u64, time: u64) -> Result<ResponseCommit, AbciError> {
        app.begin_block(RequestBeginBlock {
            height,
            time,
            hash: [0u8; 32],
            proposer: Address::default(),
        })?;
        app.deliver_tx(&height.to_be_bytes());
        app.end_block(height)?;
        app.commit()
    }

    #[test]
    fn test_commit_advances_height_and_hash() {
        let (mut app, _) = make_app(AppOptions::default());
        init(&mut app);
        let genesis_hash = app.last_app_hash();
        let res = run_block(&mut app, 1, 10).unwrap();
        assert_eq!(app.last_height(), 1);
        assert_ne!(app.last_app_hash(), genesis_hash);
        assert_eq!(res.data, app.last_app_hash().to_vec());
        assert_eq!(app.snapshot(1).unwrap().unwrap().tx_count, 1);
    }

    #[test]
    fn test_state_survives_reconstruction() {
        let (mut app, store) = make_app(AppOptions::default());
        init(&mut app);
        run_block(&mut app, 1, 10).unwrap();
        run_block(&mut app, 2, 11).unwrap();
        let hash = app.last_app_hash();

        let reopened =
            VigilApp::new(store, AppOptions::default(), ModuleRegistry::new()).unwrap();
        assert_eq!(reopened.last_height(), 2);
        assert_eq!(reopened.last_app_hash(), hash);
        assert_eq!(reopened.chain_id(), "vigil-test");
    }

    #[test]
    fn test_halt_height_refuses_commit() {
        let (mut app, _) = make_app(AppOptions {
            halt_height: Some(3),
            ..Default::default()
        });
        init(&mut app);
        run_block(&mut app, 1, 0).unwrap();
        run_block(&mut app, 2, 0).unwrap();
        let err = run_block(&mut app, 3, 0).unwrap_err();
        assert!(err.to_string().contains("halt height 3 reached"));
        assert_eq!(app.last_height(), 2);
    }

    #[test]
    fn test_halt_time_refuses_commit() {
        let (mut app, _) = make_app(AppOptions {
            halt_time: Some(1_000),
            ..Default::default()
        });
        init(&mut app);
        run_block(&mut app, 1, 999).unwrap();
        assert!(run_block(&mut app, 2, 1_000).is_err());
    }

    #[test]
    fn test_no_halt_when_unset() {
        let (mut app, _) = make_app(AppOptions::default());
        init(&mut app);
        for h in 1..=5 {
            run_block(&mut app, h, u64::MAX).unwrap();
        }
    }

    #[test]
    fn test_pruning_everything_keeps_latest() {
        let (mut app, _) = make_app(AppOptions {
            pruning: PruningStrategy::Everything,
            ..Default::default()
        });
        init(&mut app);
        for h in 1..=4 {
            run_block(&mut app, h, 0).unwrap();
        }
        assert!(app.snapshot(3).unwrap().is_none());
        assert!(app.snapshot(4).unwrap().is_some());
    }

    #[test]
    fn test_pruning_nothing_keeps_all() {
        let (mut app, store) = make_app(AppOptions {
            pruning: PruningStrategy::Nothing,
            ..Default::default()
        });
        init(&mut app);
        for h in 1..=4 {
            run_block(&mut app, h, 0).unwrap();
        }
        assert_eq!(store.prefix_scan(SNAPSHOT_PREFIX).unwrap().len(), 4);
    }

    #[test]
    fn test_invalid_genesis_rejected_by_init_chain() {
        let (mut app, _) = make_app(AppOptions::default());
        let bad = serde_json::json!({ "checkpoint": { "params": {
            "checkpoint_buffer_time_secs": 0,
            "avg_checkpoint_length": 1,
            "max_checkpoint_length": 1,
            "child_block_interval": 1
        }}});
        let res = dispatch(
            &mut app,
            Request::InitChain(RequestInitChain {
                time: 0,
                chain_id: "c".into(),
                initial_height: 1,
                validators: vec![],
                app_state_bytes: serde_json::to_vec(&bad).unwrap(),
            }),
        );
        match res {
            Response::Exception { error } => assert!(error.contains("'checkpoint'")),
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_order_block_rejected() {
        let (mut app, _) = make_app(AppOptions::default());
        init(&mut app);
        assert!(run_block(&mut app, 2, 0).is_err());
    }

    #[test]
    fn test_queries() {
        let (mut app, store) = make_app(AppOptions {
            min_gas_prices: "1matic".parse().unwrap(),
            ..Default::default()
        });
        init(&mut app);
        run_block(&mut app, 1, 0).unwrap();
        store.put(b"custom", b"value").unwrap();

        let q = |path: &str, data: &[u8]| {
            app.query(RequestQuery {
                path: path.to_string(),
                data: data.to_vec(),
                height: 0,
            })
        };
        assert_eq!(q("app/height", b"").value, b"1".to_vec());
        assert_eq!(q("app/min_gas_prices", b"").value, b"1matic".to_vec());
        assert_eq!(q("store/key", b"custom").value, b"value".to_vec());
        assert_eq!(q("store/key", b"missing").code, CODE_NOT_FOUND);
        assert_eq!(q("snapshot", b"").code, CODE_OK);
        assert_eq!(q("nope", b"").code, CODE_UNKNOWN_PATH);
    }
}
