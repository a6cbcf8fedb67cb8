use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Address;
use crate::constants::{ADDRESS_LENGTH, PUBKEY_LENGTH, UNCOMPRESSED_POINT_TAG};
use crate::error::TypesError;
use crate::primitives::{keccak256, strip_hex_prefix};

/// Uncompressed secp256k1 public key of a validator (65 bytes, `0x04 || X || Y`).
///
/// The all-zero value is [`PublicKey::ZERO`], the "empty key" sentinel; it is
/// never a valid identity.
///
/// Formats:
/// - text: `0x` + lowercase hex ([`fmt::Display`]) or bare hex ([`PublicKey::to_hex`]);
///   parsing accepts both.
/// - structured documents (serde): the `0x` string.
/// - binary wire / borsh: the raw 65 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBKEY_LENGTH]);

impl PublicKey {
    /// The empty key sentinel.
    pub const ZERO: PublicKey = PublicKey([0u8; PUBKEY_LENGTH]);

    /// Build a key from raw bytes. Anything other than exactly 65 bytes is rejected.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TypesError> {
        let bytes: [u8; PUBKEY_LENGTH] =
            data.try_into().map_err(|_| TypesError::MalformedKey {
                reason: format!("expected {} bytes, got {}", PUBKEY_LENGTH, data.len()),
            })?;
        Ok(Self(bytes))
    }

    pub const fn from_array(bytes: [u8; PUBKEY_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; PUBKEY_LENGTH]
    }

    /// A usable identity: not the empty sentinel and tagged as an uncompressed point.
    pub fn is_valid(&self) -> bool {
        !self.is_zero() && self.0[0] == UNCOMPRESSED_POINT_TAG
    }

    /// Derive the validator address: the last 20 bytes of `keccak256(X || Y)`.
    pub fn address(&self) -> Address {
        let hash = keccak256(&self.0[1..]);
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&hash[32 - ADDRESS_LENGTH..]);
        Address::new(out)
    }

    /// Lowercase hex without the `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Binary wire form: the raw 65 bytes.
    pub fn marshal(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Overwrite this key from its binary wire form.
    ///
    /// Either all 65 bytes are replaced or, on error, none are.
    pub fn unmarshal(&mut self, data: &[u8]) -> Result<(), TypesError> {
        *self = Self::from_bytes(data)?;
        Ok(())
    }

    /// Overwrite this key from either hex text form.
    ///
    /// Decoding happens into a scratch value; `self` is untouched on error.
    pub fn unmarshal_text(&mut self, text: &str) -> Result<(), TypesError> {
        *self = text.parse()?;
        Ok(())
    }
}

impl Default for PublicKey {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<[u8; PUBKEY_LENGTH]> for PublicKey {
    fn from(bytes: [u8; PUBKEY_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = TypesError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(data)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl FromStr for PublicKey {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(strip_hex_prefix(s.trim())).map_err(|e| {
            TypesError::MalformedKey {
                reason: format!("invalid hex: {}", e),
            }
        })?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl BorshSerialize for PublicKey {
    fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.0)
    }
}

impl BorshDeserialize for PublicKey {
    fn deserialize_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut buf = [0u8; PUBKEY_LENGTH];
        reader.read_exact(&mut buf)?;
        Ok(Self(buf))
    }
}
