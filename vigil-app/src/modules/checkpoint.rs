use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::genesis::{decode_section, GenesisVerifier, ModuleError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointParams {
    /// How long a proposed checkpoint stays buffered before it may be replaced.
    pub checkpoint_buffer_time_secs: u64,
    pub avg_checkpoint_length: u64,
    pub max_checkpoint_length: u64,
    pub child_block_interval: u64,
}

impl Default for CheckpointParams {
    fn default() -> Self {
        Self {
            checkpoint_buffer_time_secs: 1000,
            avg_checkpoint_length: 256,
            max_checkpoint_length: 1024,
            child_block_interval: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointGenesis {
    #[serde(default)]
    pub params: CheckpointParams,
    /// Unix time of the last checkpoint with no acknowledgement.
    #[serde(default)]
    pub last_no_ack: u64,
}

/// Root-chain checkpoint submission.
pub struct CheckpointModule;

impl GenesisVerifier for CheckpointModule {
    fn name(&self) -> &'static str {
        "checkpoint"
    }

    fn verify_genesis(&self, section: Option<&Value>) -> Result<(), ModuleError> {
        let genesis: CheckpointGenesis = decode_section(section)?;
        let p = &genesis.params;
        if p.checkpoint_buffer_time_secs == 0 {
            return Err(ModuleError::invalid("checkpoint_buffer_time_secs must be positive"));
        }
        if p.avg_checkpoint_length == 0 || p.child_block_interval == 0 {
            return Err(ModuleError::invalid(
                "avg_checkpoint_length and child_block_interval must be positive",
            ));
        }
        if p.max_checkpoint_length < p.avg_checkpoint_length {
            return Err(ModuleError::invalid(format!(
                "max_checkpoint_length {} is below avg_checkpoint_length {}",
                p.max_checkpoint_length, p.avg_checkpoint_length
            )));
        }
        Ok(())
    }

    fn default_genesis(&self) -> Value {
        serde_json::to_value(CheckpointGenesis::default()).unwrap_or(Value::Null)
    }
}
