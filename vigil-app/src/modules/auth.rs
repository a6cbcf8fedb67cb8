use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use vigil_types::Address;

use crate::genesis::{decode_section, GenesisVerifier, ModuleError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    #[serde(default)]
    pub coins: Vec<Coin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGenesis {
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

impl AuthGenesis {
    pub fn validate(&self) -> Result<(), ModuleError> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.address.is_zero() {
                return Err(ModuleError::invalid("account with zero address"));
            }
            if !seen.insert(account.address) {
                return Err(ModuleError::invalid(format!(
                    "duplicate account {}",
                    account.address
                )));
            }
            let mut denoms = HashSet::new();
            for coin in &account.coins {
                if coin.denom.is_empty() {
                    return Err(ModuleError::invalid(format!(
                        "account {} holds a coin with an empty denomination",
                        account.address
                    )));
                }
                if !denoms.insert(coin.denom.as_str()) {
                    return Err(ModuleError::invalid(format!(
                        "account {} lists denomination '{}' twice",
                        account.address, coin.denom
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Accounts and balances.
pub struct AuthModule;

impl GenesisVerifier for AuthModule {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn verify_genesis(&self, section: Option<&Value>) -> Result<(), ModuleError> {
        decode_section::<AuthGenesis>(section)?.validate()
    }

    fn default_genesis(&self) -> Value {
        serde_json::json!({ "accounts": [] })
    }
}
