pub mod error;
pub mod files;
pub mod keys;
pub mod node_key;
pub mod privval;
