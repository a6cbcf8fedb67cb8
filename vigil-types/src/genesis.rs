use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::constants::MAX_CHAIN_ID_LENGTH;
use crate::error::TypesError;
use crate::pubkey::PublicKey;

/// The genesis document shared by the consensus engine and the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisDoc {
    /// Genesis time (RFC 3339).
    pub genesis_time: String,
    /// Chain identifier.
    pub chain_id: String,
    /// Height of the first block.
    #[serde(default = "default_initial_height")]
    pub initial_height: u64,
    /// Initial validator set.
    #[serde(default)]
    pub validators: Vec<GenesisValidator>,
    /// Expected application hash after `InitChain`, hex (may be empty).
    #[serde(default)]
    pub app_hash: String,
    /// Opaque application state, decoded by the application's modules.
    #[serde(default)]
    pub app_state: serde_json::Value,
}

fn default_initial_height() -> u64 {
    1
}

/// A validator in the genesis document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Validator address, derived from `pub_key`.
    pub address: Address,
    /// Validator public key.
    pub pub_key: PublicKey,
    /// Voting power.
    pub power: u64,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
}

impl GenesisDoc {
    /// Parse a genesis document from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, TypesError> {
        let doc: GenesisDoc =
            serde_json::from_str(json).map_err(|e| TypesError::DeserializationError {
                reason: format!("failed to parse genesis document: {}", e),
            })?;
        doc.validate()?;
        Ok(doc)
    }

    /// Check the structural invariants of the document.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.chain_id.is_empty() {
            return Err(TypesError::InvalidGenesis {
                reason: "chain_id must not be empty".to_string(),
            });
        }
        if self.chain_id.len() > MAX_CHAIN_ID_LENGTH {
            return Err(TypesError::InvalidGenesis {
                reason: format!(
                    "chain_id is {} characters, max is {}",
                    self.chain_id.len(),
                    MAX_CHAIN_ID_LENGTH
                ),
            });
        }
        if self.initial_height == 0 {
            return Err(TypesError::InvalidGenesis {
                reason: "initial_height must be at least 1".to_string(),
            });
        }
        for (i, v) in self.validators.iter().enumerate() {
            if v.pub_key.is_zero() {
                return Err(TypesError::InvalidGenesis {
                    reason: format!("validator {} has an empty public key", i),
                });
            }
            if v.power == 0 {
                return Err(TypesError::InvalidGenesis {
                    reason: format!("validator {} has zero power", i),
                });
            }
            if v.address != v.pub_key.address() {
                return Err(TypesError::InvalidGenesis {
                    reason: format!(
                        "validator {} address {} does not match public key",
                        i, v.address
                    ),
                });
            }
        }
        Ok(())
    }

    /// Serialize as indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, TypesError> {
        serde_json::to_string_pretty(self).map_err(|e| TypesError::DeserializationError {
            reason: format!("failed to serialize genesis document: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PUBKEY_LENGTH;

    fn make_validator() -> GenesisValidator {
        let mut bytes = [3u8; PUBKEY_LENGTH];
        bytes[0] = 0x04;
        let pub_key = PublicKey::from_array(bytes);
        GenesisValidator {
            address: pub_key.address(),
            pub_key,
            power: 10,
            name: "val-0".to_string(),
        }
    }

    fn make_doc() -> GenesisDoc {
        GenesisDoc {
            genesis_time: "2024-01-01T00:00:00Z".to_string(),
            chain_id: "vigil-test".to_string(),
            initial_height: 1,
            validators: vec![make_validator()],
            app_hash: String::new(),
            app_state: serde_json::json!({ "auth": { "accounts": [] } }),
        }
    }

    #[test]
    fn test_valid_doc_roundtrip() {
        let doc = make_doc();
        let json = doc.to_json_pretty().unwrap();
        let back = GenesisDoc::from_json(&json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_empty_chain_id_rejected() {
        let mut doc = make_doc();
        doc.chain_id.clear();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_address_mismatch_rejected() {
        let mut doc = make_doc();
        doc.validators[0].address = Address::new([9u8; 20]);
        let err = doc.validate().unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_zero_power_rejected() {
        let mut doc = make_doc();
        doc.validators[0].power = 0;
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_missing_initial_height_defaults_to_one() {
        let json = r#"{"genesis_time":"2024-01-01T00:00:00Z","chain_id":"c"}"#;
        let doc = GenesisDoc::from_json(json).unwrap();
        assert_eq!(doc.initial_height, 1);
        assert!(doc.validators.is_empty());
    }

    #[test]
    fn test_malformed_pubkey_in_document() {
        let json = r#"{"genesis_time":"t","chain_id":"c","validators":[{"address":"0x0000000000000000000000000000000000000000","pub_key":"0xzz","power":1}]}"#;
        let err = GenesisDoc::from_json(json).unwrap_err();
        assert!(err.to_string().contains("malformed key"));
    }
}
