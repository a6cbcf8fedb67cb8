use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    /// "ok" while running, otherwise the lifecycle state.
    pub status: String,
    pub lifecycle: String,
    /// Last committed application height.
    pub height: u64,
    pub version: String,
}

/// Node identity and wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node ID as hex string.
    pub node_id: String,
    pub chain_id: String,
    pub version: String,
    /// Whether the consensus engine runs in-process.
    pub embedded_engine: bool,
}

/// The validator this node signs for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorInfo {
    /// EIP-55 checksummed address.
    pub address: String,
    /// `0x`-prefixed uncompressed public key.
    pub pub_key: String,
}

/// Application info as reported through the engine connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub last_block_height: u64,
    /// Hex, empty before the first block.
    pub last_block_app_hash: String,
}

/// Result of an application query. `key` and `value` are hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub code: u32,
    pub log: String,
    pub key: String,
    pub value: String,
    pub height: u64,
}
