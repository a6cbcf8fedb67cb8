use std::path::Path;

use vigil_app::modules::staking::{StakingGenesis, StakingValidator};
use vigil_app::{AppGenesisState, ModuleRegistry};
use vigil_crypto::node_key::NodeId;
use vigil_types::constants::DEFAULT_VALIDATOR_POWER;
use vigil_types::genesis::{GenesisDoc, GenesisValidator};
use vigil_types::PublicKey;

use crate::config::HomeDir;
use crate::error::NodeError;

/// Chain id for a freshly initialized home, derived from the node id.
pub fn default_chain_id(node_id: &NodeId) -> String {
    let id = node_id.to_string();
    format!("vigil-{}", &id[..8])
}

/// A one-validator genesis with every module's default section and the
/// validator registered with the staking module.
pub fn default_genesis_doc(
    chain_id: &str,
    pub_key: &PublicKey,
    registry: &ModuleRegistry,
) -> Result<GenesisDoc, NodeError> {
    let mut app_state = registry.default_genesis();
    let staking = StakingGenesis {
        validators: vec![StakingValidator {
            id: 1,
            signer: pub_key.address(),
            pub_key: *pub_key,
            power: DEFAULT_VALIDATOR_POWER,
        }],
    };
    let staking = serde_json::to_value(staking).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to encode staking genesis: {}", e),
    })?;
    app_state.set_section("staking", staking);

    let doc = GenesisDoc {
        genesis_time: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        chain_id: chain_id.to_string(),
        initial_height: 1,
        validators: vec![GenesisValidator {
            address: pub_key.address(),
            pub_key: *pub_key,
            power: DEFAULT_VALIDATOR_POWER,
            name: "validator-1".to_string(),
        }],
        app_hash: String::new(),
        app_state: app_state.into_value(),
    };
    doc.validate()?;
    Ok(doc)
}

/// Load and structurally validate a genesis document.
pub fn load_genesis(path: &Path) -> Result<GenesisDoc, NodeError> {
    let json = std::fs::read_to_string(path).map_err(|e| NodeError::GenesisError {
        reason: format!("failed to read genesis file '{}': {}", path.display(), e),
    })?;
    GenesisDoc::from_json(&json).map_err(|e| NodeError::GenesisError {
        reason: format!("{}: {}", path.display(), e),
    })
}

/// Load `<home>/config/genesis.json`, writing a default one first if missing.
pub fn load_or_create(
    home: &HomeDir,
    chain_id: &str,
    pub_key: &PublicKey,
    registry: &ModuleRegistry,
) -> Result<GenesisDoc, NodeError> {
    let path = home.genesis_file();
    if path.exists() {
        return load_genesis(&path);
    }
    home.ensure()?;
    let doc = default_genesis_doc(chain_id, pub_key, registry)?;
    std::fs::write(&path, doc.to_json_pretty()?)?;
    tracing::info!(path = %path.display(), chain_id = %doc.chain_id, "wrote genesis file");
    Ok(doc)
}

/// Run the module registry over the document's `app_state`.
pub fn verify_app_state(doc: &GenesisDoc, registry: &ModuleRegistry) -> Result<(), NodeError> {
    let state = AppGenesisState::from_value(doc.app_state.clone()).map_err(|e| {
        NodeError::GenesisVerificationError {
            module: "app_state".to_string(),
            reason: e.to_string(),
        }
    })?;
    registry.verify_genesis(&state)?;
    Ok(())
}

/// Decode `<home>/config/genesis.json` and verify its application state.
pub fn verify_genesis_file(
    home: &HomeDir,
    registry: &ModuleRegistry,
) -> Result<GenesisDoc, NodeError> {
    let doc = load_genesis(&home.genesis_file())?;
    verify_app_state(&doc, registry)?;
    Ok(doc)
}
