//! The request/response protocol between the consensus engine and the
//! application, its wire codec, and the two transports that carry it.
//!
//! - [`client::LocalClient`] dispatches in-process, no serialization.
//! - [`server::SocketServer`] accepts one engine connection at a time over TCP,
//!   framed by [`codec`].

pub mod application;
pub mod client;
pub mod codec;
pub mod error;
pub mod server;
pub mod types;

pub use application::{dispatch, Application};
pub use client::{AppConnection, LocalClient, SocketClient};
pub use error::AbciError;
pub use server::{parse_listen_addr, SocketServer};
pub use types::{Request, Response};
