use std::fmt;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use vigil_types::{Address, PublicKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// 64-byte compact ECDSA signature (`r || s`).
pub type Signature = [u8; 64];

/// Tracing target for operations that expose secret key material.
pub const AUDIT_TARGET: &str = "audit";

/// Validator private key handle (secp256k1).
///
/// The secret bytes are never printed by `Debug` and are only reachable through
/// [`PrivateKey::expose_secret_hex`], which leaves an audit trail. The inner
/// signing key is wiped on drop.
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        Self {
            inner: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    /// Load a key from its 32 secret bytes.
    pub fn from_bytes(secret: &[u8]) -> Result<Self, CryptoError> {
        let inner = SigningKey::from_slice(secret).map_err(|e| CryptoError::InvalidKeyMaterial {
            reason: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    /// Load a key from hex, with or without a `0x` prefix.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let trimmed = vigil_types::primitives::strip_hex_prefix(text.trim());
        let bytes = Zeroizing::new(hex::decode(trimmed).map_err(|e| {
            CryptoError::InvalidKeyMaterial {
                reason: format!("invalid hex: {}", e),
            }
        })?);
        Self::from_bytes(&bytes)
    }

    /// The matching uncompressed public key.
    pub fn public_key(&self) -> PublicKey {
        let point = self.inner.verifying_key().to_encoded_point(false);
        // An uncompressed SEC1 point is always 65 bytes.
        let mut bytes = [0u8; vigil_types::constants::PUBKEY_LENGTH];
        bytes.copy_from_slice(point.as_bytes());
        PublicKey::from_array(bytes)
    }

    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Sign a message (SHA-256 prehash, low-S normalized).
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig: EcdsaSignature = self.inner.sign(message);
        let mut out = [0u8; 64];
        out.copy_from_slice(&sig.to_bytes());
        out
    }

    /// Reveal the secret as `0x`-prefixed lowercase hex.
    ///
    /// This is the only path to the raw bytes; every call is logged on the
    /// [`AUDIT_TARGET`] target with the caller-supplied purpose.
    pub fn expose_secret_hex(&self, purpose: &str) -> Zeroizing<String> {
        tracing::warn!(
            target: AUDIT_TARGET,
            address = %self.address(),
            purpose,
            "private key material exposed"
        );
        let bytes = Zeroizing::new(self.inner.to_bytes().to_vec());
        Zeroizing::new(format!("0x{}", hex::encode(bytes.as_slice())))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// The consensus engine's view of a validator [`PublicKey`].
///
/// Borrows the same 65 bytes rather than copying them, so the engine-facing key
/// and the canonical key can never drift apart.
#[derive(Debug, Clone, Copy)]
pub struct EngineKey<'a> {
    key: &'a PublicKey,
}

impl<'a> EngineKey<'a> {
    pub fn new(key: &'a PublicKey) -> Self {
        Self { key }
    }

    pub fn public_key(&self) -> &'a PublicKey {
        self.key
    }

    pub fn address(&self) -> Address {
        self.key.address()
    }

    /// Parse the bytes as a secp256k1 point.
    pub fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        if self.key.is_zero() {
            return Err(CryptoError::InvalidKeyMaterial {
                reason: "empty public key".to_string(),
            });
        }
        VerifyingKey::from_sec1_bytes(self.key.as_bytes()).map_err(|e| {
            CryptoError::InvalidKeyMaterial {
                reason: e.to_string(),
            }
        })
    }

    /// Verify a signature produced by [`PrivateKey::sign`].
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let vk = self.verifying_key()?;
        let sig =
            EcdsaSignature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
        vk.verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// Access the engine view of a public key.
pub trait EngineKeyExt {
    fn engine_key(&self) -> EngineKey<'_>;
}

impl EngineKeyExt for PublicKey {
    fn engine_key(&self) -> EngineKey<'_> {
        EngineKey::new(self)
    }
}
