//! Shared types for the Vigil validator node.
//!
//! The [`pubkey::PublicKey`] type is the canonical validator identity: every
//! other crate (signing, peer identity, genesis accounting) goes through it.

pub mod address;
pub mod constants;
pub mod error;
pub mod genesis;
pub mod primitives;
pub mod pubkey;

pub use address::Address;
pub use error::TypesError;
pub use pubkey::PublicKey;
