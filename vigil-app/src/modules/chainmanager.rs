use serde::{Deserialize, Serialize};
use serde_json::Value;
use vigil_types::Address;

use crate::genesis::{decode_section, GenesisVerifier, ModuleError};

/// Contract addresses on the root chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainContracts {
    pub root_chain_address: Address,
    pub staking_manager_address: Address,
    pub state_sender_address: Address,
}

impl Default for ChainContracts {
    fn default() -> Self {
        let dev = |last: u8| {
            let mut bytes = [0u8; 20];
            bytes[19] = last;
            Address::new(bytes)
        };
        Self {
            root_chain_address: dev(1),
            staking_manager_address: dev(2),
            state_sender_address: dev(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainManagerParams {
    pub main_chain_id: String,
    pub sidechain_id: String,
    pub main_chain_tx_confirmations: u64,
    pub sidechain_tx_confirmations: u64,
    pub contracts: ChainContracts,
}

impl Default for ChainManagerParams {
    fn default() -> Self {
        Self {
            main_chain_id: "1".to_string(),
            sidechain_id: "15001".to_string(),
            main_chain_tx_confirmations: 6,
            sidechain_tx_confirmations: 10,
            contracts: ChainContracts::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainManagerGenesis {
    #[serde(default)]
    pub params: ChainManagerParams,
}

/// Chain ids and root-chain contracts the relay and checkpoint logic depend on.
pub struct ChainManagerModule;

impl GenesisVerifier for ChainManagerModule {
    fn name(&self) -> &'static str {
        "chainmanager"
    }

    fn verify_genesis(&self, section: Option<&Value>) -> Result<(), ModuleError> {
        let genesis: ChainManagerGenesis = decode_section(section)?;
        let p = &genesis.params;
        if p.main_chain_id.trim().is_empty() || p.sidechain_id.trim().is_empty() {
            return Err(ModuleError::invalid("main_chain_id and sidechain_id are required"));
        }
        if p.main_chain_id == p.sidechain_id {
            return Err(ModuleError::invalid(format!(
                "main chain and sidechain share chain id '{}'",
                p.main_chain_id
            )));
        }
        if p.main_chain_tx_confirmations == 0 || p.sidechain_tx_confirmations == 0 {
            return Err(ModuleError::invalid("tx confirmations must be positive"));
        }
        let contracts = [
            ("root_chain_address", p.contracts.root_chain_address),
            ("staking_manager_address", p.contracts.staking_manager_address),
            ("state_sender_address", p.contracts.state_sender_address),
        ];
        for (name, address) in contracts {
            if address.is_zero() {
                return Err(ModuleError::invalid(format!("{} is not set", name)));
            }
        }
        Ok(())
    }

    fn default_genesis(&self) -> Value {
        serde_json::to_value(ChainManagerGenesis::default()).unwrap_or(Value::Null)
    }
}
