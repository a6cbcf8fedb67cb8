// ─── Identity Parameters ─────────────────────────────────────────────────────

/// Length of an uncompressed secp256k1 public key.
pub const PUBKEY_LENGTH: usize = 65;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Leading tag byte of an uncompressed SEC1 point.
pub const UNCOMPRESSED_POINT_TAG: u8 = 0x04;

// ─── Genesis Parameters ──────────────────────────────────────────────────────

/// Maximum length of a chain identifier.
pub const MAX_CHAIN_ID_LENGTH: usize = 50;

/// Voting power assigned to the local validator by `vigil init`.
pub const DEFAULT_VALIDATOR_POWER: u64 = 10_000;
