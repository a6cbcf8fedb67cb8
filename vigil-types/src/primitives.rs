use sha3::{Digest, Keccak256};

/// 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// Block height.
pub type Height = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Compute the Keccak-256 hash of the given data.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Strip an optional `0x`/`0X` prefix from a hex string.
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}
