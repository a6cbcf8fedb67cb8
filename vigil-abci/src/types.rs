use borsh::{BorshDeserialize, BorshSerialize};
use vigil_types::primitives::{Hash, Height, Timestamp};
use vigil_types::{Address, PublicKey};

/// A validator power change, exchanged at genesis and at the end of a block.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ValidatorUpdate {
    pub pub_key: PublicKey,
    pub power: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RequestInitChain {
    pub time: Timestamp,
    pub chain_id: String,
    pub initial_height: Height,
    pub validators: Vec<ValidatorUpdate>,
    /// JSON-encoded application genesis state.
    pub app_state_bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RequestBeginBlock {
    pub height: Height,
    pub time: Timestamp,
    pub hash: Hash,
    pub proposer: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RequestQuery {
    pub path: String,
    pub data: Vec<u8>,
    /// 0 means latest.
    pub height: Height,
}

/// Engine-to-application requests.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Request {
    Echo { message: String },
    Flush,
    Info { version: String },
    InitChain(RequestInitChain),
    BeginBlock(RequestBeginBlock),
    DeliverTx { tx: Vec<u8> },
    EndBlock { height: Height },
    Commit,
    Query(RequestQuery),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Echo { .. } => "echo",
            Request::Flush => "flush",
            Request::Info { .. } => "info",
            Request::InitChain(_) => "init_chain",
            Request::BeginBlock(_) => "begin_block",
            Request::DeliverTx { .. } => "deliver_tx",
            Request::EndBlock { .. } => "end_block",
            Request::Commit => "commit",
            Request::Query(_) => "query",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ResponseInfo {
    pub data: String,
    pub version: String,
    pub last_block_height: Height,
    pub last_block_app_hash: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ResponseInitChain {
    pub validators: Vec<ValidatorUpdate>,
    pub app_hash: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ResponseDeliverTx {
    pub code: u32,
    pub log: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ResponseEndBlock {
    pub validator_updates: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ResponseCommit {
    /// The new application hash.
    pub data: Vec<u8>,
    /// Blocks below this height may be discarded by the engine.
    pub retain_height: Height,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ResponseQuery {
    pub code: u32,
    pub log: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub height: Height,
}

/// Application-to-engine responses. Any request may be answered by `Exception`.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Response {
    Exception { error: String },
    Echo { message: String },
    Flush,
    Info(ResponseInfo),
    InitChain(ResponseInitChain),
    BeginBlock,
    DeliverTx(ResponseDeliverTx),
    EndBlock(ResponseEndBlock),
    Commit(ResponseCommit),
    Query(ResponseQuery),
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Exception { .. } => "exception",
            Response::Echo { .. } => "echo",
            Response::Flush => "flush",
            Response::Info(_) => "info",
            Response::InitChain(_) => "init_chain",
            Response::BeginBlock => "begin_block",
            Response::DeliverTx(_) => "deliver_tx",
            Response::EndBlock(_) => "end_block",
            Response::Commit(_) => "commit",
            Response::Query(_) => "query",
        }
    }
}
