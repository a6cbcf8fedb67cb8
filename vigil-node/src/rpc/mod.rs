//! Query server: JSON-RPC over HTTP, run as a sidecar.

pub mod handlers;
pub mod server;
pub mod types;

pub use server::QueryServer;
