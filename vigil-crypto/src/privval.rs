//! File-backed private validator: the signing key plus the last-signed state
//! that prevents double signing across restarts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vigil_types::primitives::Hash;
use vigil_types::{Address, PublicKey};

use crate::error::CryptoError;
use crate::files::{read_json, write_json_private};
use crate::keys::{PrivateKey, Signature};

/// On-disk layout of the private validator key file.
#[derive(Serialize, Deserialize)]
struct PrivValidatorKeyFile {
    address: Address,
    pub_key: PublicKey,
    priv_key: String,
}

/// Last height/round this validator signed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignState {
    pub height: u64,
    pub round: u32,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Validator signer backed by a key file and a state file.
#[derive(Debug)]
pub struct FilePrivValidator {
    key: PrivateKey,
    pub_key: PublicKey,
    state: SignState,
    state_path: PathBuf,
}

impl FilePrivValidator {
    /// Load both files, generating whichever is missing.
    ///
    /// An existing key file is never overwritten; a key file whose stored
    /// public key does not match its private key is rejected.
    pub fn load_or_generate(key_path: &Path, state_path: &Path) -> Result<Self, CryptoError> {
        let key = if key_path.exists() {
            load_key_file(key_path)?
        } else {
            let key = PrivateKey::generate();
            let pub_key = key.public_key();
            let file = PrivValidatorKeyFile {
                address: pub_key.address(),
                pub_key,
                priv_key: key.expose_secret_hex("persist new validator key").to_string(),
            };
            write_json_private(key_path, &file)?;
            tracing::info!(
                path = %key_path.display(),
                address = %pub_key.address(),
                "generated private validator key"
            );
            key
        };

        let state = if state_path.exists() {
            read_json(state_path)?
        } else {
            let state = SignState::default();
            write_json_private(state_path, &state)?;
            state
        };

        Ok(Self {
            pub_key: key.public_key(),
            key,
            state,
            state_path: state_path.to_path_buf(),
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.pub_key
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.key
    }

    pub fn last_sign_state(&self) -> &SignState {
        &self.state
    }

    /// Sign a block hash at `height`/`round`.
    ///
    /// Re-signing the same height, round and hash returns the stored signature.
    /// Signing anything at or below the last signed position otherwise fails.
    /// The new state is persisted before the signature is returned.
    pub fn sign_block(
        &mut self,
        height: u64,
        round: u32,
        block_hash: &Hash,
    ) -> Result<Signature, CryptoError> {
        let hash_hex = hex::encode(block_hash);
        let last = &self.state;
        let same_position = height == last.height && round == last.round;

        if same_position && last.block_hash.as_deref() == Some(hash_hex.as_str()) {
            if let Some(sig) = last.signature.as_deref().and_then(decode_signature) {
                return Ok(sig);
            }
        }
        if height < last.height || (height == last.height && round <= last.round && last.height > 0)
        {
            return Err(CryptoError::DoubleSign {
                height,
                round,
                last_height: last.height,
                last_round: last.round,
            });
        }

        let signature = self.key.sign(&block_sign_bytes(height, round, block_hash));
        let next = SignState {
            height,
            round,
            block_hash: Some(hash_hex),
            signature: Some(hex::encode(signature)),
        };
        write_json_private(&self.state_path, &next)?;
        self.state = next;
        Ok(signature)
    }
}

/// Read only the key file (used by display commands that must not touch state).
pub fn load_key_file(path: &Path) -> Result<PrivateKey, CryptoError> {
    let file: PrivValidatorKeyFile = read_json(path)?;
    let key = PrivateKey::from_hex(&file.priv_key).map_err(|e| CryptoError::KeyFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if key.public_key() != file.pub_key || file.pub_key.address() != file.address {
        return Err(CryptoError::KeyMismatch {
            path: path.to_path_buf(),
        });
    }
    Ok(key)
}

/// Overwrite the sign state with the zero state. Only safe when the chain
/// data it guarded is deleted too.
pub fn reset_sign_state(state_path: &Path) -> Result<(), CryptoError> {
    write_json_private(state_path, &SignState::default())?;
    tracing::warn!(path = %state_path.display(), "reset private validator state to height 0");
    Ok(())
}

/// The bytes a block signature covers: `height (BE) || round (BE) || hash`.
pub fn block_sign_bytes(height: u64, round: u32, block_hash: &Hash) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + 4 + block_hash.len());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&round.to_be_bytes());
    bytes.extend_from_slice(block_hash);
    bytes
}

fn decode_signature(text: &str) -> Option<Signature> {
    hex::decode(text).ok()?.try_into().ok()
}
