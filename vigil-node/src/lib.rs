//! The `vigil` validator node: configuration, identity, engine/application
//! wiring, sidecar services and the process lifecycle.

pub mod app_factory;
pub mod banner;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod genesis;
pub mod identity;
pub mod metrics;
pub mod node;
pub mod profiler;
pub mod relay;
pub mod rpc;
pub mod shutdown;
pub mod sidecar;
pub mod transport;
