use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vigil_types::{Address, PublicKey};

use crate::genesis::{decode_section, GenesisVerifier, ModuleError};

/// A validator as recorded by the staking module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingValidator {
    pub id: u64,
    pub signer: Address,
    pub pub_key: PublicKey,
    pub power: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingGenesis {
    #[serde(default)]
    pub validators: Vec<StakingValidator>,
}

impl StakingGenesis {
    pub fn validate(&self) -> Result<(), ModuleError> {
        let mut ids = HashSet::new();
        let mut signers = HashSet::new();
        for v in &self.validators {
            if v.pub_key.is_zero() {
                return Err(ModuleError::invalid(format!(
                    "validator {} has an empty public key",
                    v.id
                )));
            }
            if v.power == 0 {
                return Err(ModuleError::invalid(format!("validator {} has zero power", v.id)));
            }
            if v.signer != v.pub_key.address() {
                return Err(ModuleError::invalid(format!(
                    "validator {} signer {} does not match public key address {}",
                    v.id,
                    v.signer,
                    v.pub_key.address()
                )));
            }
            if !ids.insert(v.id) {
                return Err(ModuleError::invalid(format!("duplicate validator id {}", v.id)));
            }
            if !signers.insert(v.signer) {
                return Err(ModuleError::invalid(format!(
                    "duplicate validator signer {}",
                    v.signer
                )));
            }
        }
        Ok(())
    }
}

/// Validator set.
pub struct StakingModule;

impl GenesisVerifier for StakingModule {
    fn name(&self) -> &'static str {
        "staking"
    }

    fn verify_genesis(&self, section: Option<&Value>) -> Result<(), ModuleError> {
        decode_section::<StakingGenesis>(section)?.validate()
    }

    fn default_genesis(&self) -> Value {
        serde_json::json!({ "validators": [] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::constants::PUBKEY_LENGTH;

    fn key(byte: u8) -> PublicKey {
        let mut bytes = [byte; PUBKEY_LENGTH];
        bytes[0] = 0x04;
        PublicKey::from_array(bytes)
    }

    fn validator(id: u64, byte: u8) -> StakingValidator {
        let pub_key = key(byte);
        StakingValidator {
            id,
            signer: pub_key.address(),
            pub_key,
            power: 10,
        }
    }

    #[test]
    fn test_valid_set() {
        let genesis = StakingGenesis {
            validators: vec![validator(1, 1), validator(2, 2)],
        };
        assert!(genesis.validate().is_ok());
    }

    #[test]
    fn test_signer_mismatch() {
        let mut v = validator(1, 1);
        v.signer = Address::new([7u8; 20]);
        let err = StakingGenesis { validators: vec![v] }.validate().unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_duplicate_id() {
        let genesis = StakingGenesis {
            validators: vec![validator(1, 1), validator(1, 2)],
        };
        assert!(genesis.validate().is_err());
    }

    #[test]
    fn test_empty_key_rejected_through_json() {
        let section = serde_json::json!({
            "validators": [{
                "id": 1,
                "signer": PublicKey::ZERO.address().to_string(),
                "pub_key": PublicKey::ZERO.to_string(),
                "power": 1
            }]
        });
        let err = StakingModule.verify_genesis(Some(&section)).unwrap_err();
        assert!(err.to_string().contains("empty public key"));
    }
}
