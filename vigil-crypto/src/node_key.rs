use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::files::{read_json, write_json_private};

/// Length of a node ID in bytes.
pub const NODE_ID_LENGTH: usize = 20;

/// Peer identity of the node: `BLAKE3(ed25519 pubkey)[0..20]`, shown as hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; NODE_ID_LENGTH]);

impl NodeId {
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LENGTH] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

/// The node's peer key (Ed25519). Distinct from the validator signing key.
pub struct NodeKey {
    inner: ed25519_dalek::SigningKey,
}

#[derive(Serialize, Deserialize)]
struct NodeKeyFile {
    #[serde(rename = "type")]
    key_type: String,
    priv_key: String,
}

const NODE_KEY_TYPE: &str = "ed25519";

impl NodeKey {
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.inner.verifying_key().to_bytes()
    }

    pub fn node_id(&self) -> NodeId {
        let hash = blake3::hash(&self.public_key());
        let mut id = [0u8; NODE_ID_LENGTH];
        id.copy_from_slice(&hash.as_bytes()[..NODE_ID_LENGTH]);
        NodeId(id)
    }

    /// Load the node key file, or generate and persist a new one if absent.
    ///
    /// A file that exists but cannot be parsed is an error; it is never replaced.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            return Self::load(path);
        }
        let key = Self::generate();
        let seed = Zeroizing::new(key.inner.to_bytes());
        let file = NodeKeyFile {
            key_type: NODE_KEY_TYPE.to_string(),
            priv_key: hex::encode(seed.as_slice()),
        };
        write_json_private(path, &file)?;
        tracing::info!(path = %path.display(), node_id = %key.node_id(), "generated node key");
        Ok(key)
    }

    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let file: NodeKeyFile = read_json(path)?;
        if file.key_type != NODE_KEY_TYPE {
            return Err(CryptoError::KeyFile {
                path: path.to_path_buf(),
                reason: format!("unsupported key type '{}'", file.key_type),
            });
        }
        let bytes = Zeroizing::new(hex::decode(&file.priv_key).map_err(|e| {
            CryptoError::KeyFile {
                path: path.to_path_buf(),
                reason: format!("invalid hex: {}", e),
            }
        })?);
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| CryptoError::KeyFile {
            path: path.to_path_buf(),
            reason: format!("expected 32-byte seed, got {}", bytes.len()),
        })?;
        Ok(Self::from_seed(&seed))
    }
}
