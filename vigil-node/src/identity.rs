//! Validator identity material and the display commands built on it.

use serde::Serialize;
use vigil_crypto::keys::PrivateKey;
use vigil_crypto::node_key::{NodeId, NodeKey};
use vigil_crypto::privval::{load_key_file, FilePrivValidator};
use vigil_types::{Address, PublicKey};

use crate::config::HomeDir;
use crate::error::NodeError;

/// Node identity, validator public key and the signer holding the private key.
///
/// Produced once at startup. The signer moves into the consensus engine, which
/// is then the only holder of the private key.
#[derive(Debug)]
pub struct ValidatorIdentity {
    node_id: NodeId,
    pub_key: PublicKey,
    signer: FilePrivValidator,
}

impl ValidatorIdentity {
    /// Load the node key and the private-validator key/state pair, generating
    /// any file that does not exist yet.
    pub fn load_or_generate(home: &HomeDir) -> Result<Self, NodeError> {
        home.ensure()?;
        let node_key = NodeKey::load_or_generate(&home.node_key_file())?;
        let signer = FilePrivValidator::load_or_generate(
            &home.priv_validator_key_file(),
            &home.priv_validator_state_file(),
        )?;
        let pub_key = signer.public_key();
        if !pub_key.is_valid() {
            return Err(NodeError::MalformedKey {
                reason: "validator public key is not an uncompressed secp256k1 point".to_string(),
            });
        }
        let identity = Self {
            node_id: node_key.node_id(),
            pub_key,
            signer,
        };
        tracing::info!(
            node_id = %identity.node_id,
            address = %identity.address(),
            "validator identity loaded"
        );
        Ok(identity)
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.pub_key
    }

    pub fn address(&self) -> Address {
        self.pub_key.address()
    }

    /// Hand the signer over to the engine.
    pub fn into_signer(self) -> FilePrivValidator {
        self.signer
    }
}

#[derive(Serialize)]
struct IdentityView {
    address: String,
    pub_key: String,
}

#[derive(Serialize)]
struct PrivateKeyView<'a> {
    priv_key: &'a str,
}

/// `{address, pub_key}` as pretty JSON.
pub fn identity_json(pub_key: &PublicKey) -> Result<String, NodeError> {
    let view = IdentityView {
        address: pub_key.address().to_string(),
        pub_key: pub_key.to_string(),
    };
    serde_json::to_string_pretty(&view).map_err(|e| NodeError::ConfigError {
        reason: format!("failed to encode identity: {}", e),
    })
}

/// `{priv_key}` as pretty JSON. Exposing the key is audited.
pub fn private_key_json(key: &PrivateKey) -> Result<String, NodeError> {
    let secret = key.expose_secret_hex("show-private-key");
    let view = PrivateKeyView {
        priv_key: secret.as_str(),
    };
    serde_json::to_string_pretty(&view).map_err(|e| NodeError::ConfigError {
        reason: format!("failed to encode private key: {}", e),
    })
}

/// Read the validator key without touching the signing state.
pub fn load_validator_key(home: &HomeDir) -> Result<PrivateKey, NodeError> {
    let path = home.priv_validator_key_file();
    if !path.exists() {
        return Err(NodeError::ConfigError {
            reason: format!(
                "no validator key at {}; run `vigil init` first",
                path.display()
            ),
        });
    }
    Ok(load_key_file(&path)?)
}

pub fn load_node_id(home: &HomeDir) -> Result<NodeId, NodeError> {
    let path = home.node_key_file();
    if !path.exists() {
        return Err(NodeError::ConfigError {
            reason: format!("no node key at {}; run `vigil init` first", path.display()),
        });
    }
    Ok(NodeKey::load(&path)?.node_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_stable_across_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let home = HomeDir::new(tmp.path());
        let first = ValidatorIdentity::load_or_generate(&home).unwrap();
        let second = ValidatorIdentity::load_or_generate(&home).unwrap();
        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(first.node_id(), second.node_id());
        assert_eq!(load_node_id(&home).unwrap(), first.node_id());
        assert_eq!(load_validator_key(&home).unwrap().public_key(), first.public_key());
    }

    #[test]
    fn test_corrupt_key_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let home = HomeDir::new(tmp.path());
        home.ensure().unwrap();
        std::fs::write(home.priv_validator_key_file(), "{ not json").unwrap();
        assert!(ValidatorIdentity::load_or_generate(&home).is_err());
        // The corrupt file is left in place.
        let contents = std::fs::read_to_string(home.priv_validator_key_file()).unwrap();
        assert_eq!(contents, "{ not json");
    }

    #[test]
    fn test_identity_json_shape() {
        let key = PrivateKey::generate();
        let json = identity_json(&key.public_key()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["address"], key.address().to_string());
        let pub_key = value["pub_key"].as_str().unwrap();
        assert!(pub_key.starts_with("0x04"));
        assert_eq!(pub_key.len(), 2 + 130);
    }

    #[test]
    fn test_private_key_json_roundtrips() {
        let key = PrivateKey::generate();
        let json = private_key_json(&key).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let restored = PrivateKey::from_hex(value["priv_key"].as_str().unwrap()).unwrap();
        assert_eq!(restored.public_key(), key.public_key());
    }

    #[test]
    fn test_show_commands_need_init() {
        let tmp = tempfile::tempdir().unwrap();
        let home = HomeDir::new(tmp.path());
        assert!(matches!(load_validator_key(&home), Err(NodeError::ConfigError { .. })));
        assert!(matches!(load_node_id(&home), Err(NodeError::ConfigError { .. })));
    }
}
