//! Wires the application to the consensus engine.
//!
//! Exactly one binding exists per process. Both bindings serialize access
//! through the same `Mutex`, so requests reach the application one at a time
//! in the order they were issued.

use std::sync::Arc;

use tokio::sync::Mutex;
use vigil_abci::server::SocketServerHandle;
use vigil_abci::{AbciError, Application, LocalClient, SocketServer};

use crate::config::Configuration;
use crate::error::NodeError;

/// The chosen engine/application binding.
pub enum Binding<A> {
    /// In-process client for an engine running in this process.
    Embedded(LocalClient<A>),
    /// Socket server accepting an external engine.
    Standalone(SocketServerHandle),
}

impl<A> std::fmt::Debug for Binding<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Embedded(_) => f.write_str("Binding::Embedded"),
            Binding::Standalone(handle) => {
                write!(f, "Binding::Standalone({})", handle.local_addr())
            }
        }
    }
}

/// Build the binding selected by `engine.embedded`.
///
/// In standalone mode the socket is bound before returning; a bind failure is
/// a [`NodeError::TransportBindError`] and a bad address a
/// [`NodeError::ConfigError`].
pub async fn bind<A: Application>(
    config: &Configuration,
    app: Arc<Mutex<A>>,
) -> Result<Binding<A>, NodeError> {
    if config.engine.embedded {
        tracing::info!("binding application in-process");
        return Ok(Binding::Embedded(LocalClient::from_shared(app)));
    }

    let server = SocketServer::bind(&config.engine.address)
        .await
        .map_err(|e| match e {
            AbciError::Bind { addr, reason } => NodeError::TransportBindError { addr, reason },
            AbciError::InvalidAddress { addr, reason } => NodeError::ConfigError {
                reason: format!("invalid engine address '{}': {}", addr, reason),
            },
            other => NodeError::TransportBindError {
                addr: config.engine.address.clone(),
                reason: other.to_string(),
            },
        })?;
    Ok(Binding::Standalone(server.spawn(app)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_abci::types::{Request, Response};
    use vigil_abci::{AppConnection, SocketClient};
    use vigil_storage::memory::MemoryStore;

    fn app() -> Arc<Mutex<vigil_app::VigilApp>> {
        let config = Configuration::default();
        let app = crate::app_factory::build_application(&config, Arc::new(MemoryStore::new()))
            .unwrap();
        Arc::new(Mutex::new(app))
    }

    #[tokio::test]
    async fn test_embedded_binding() {
        let config = Configuration::default();
        let binding = bind(&config, app()).await.unwrap();
        let Binding::Embedded(client) = binding else {
            panic!("expected embedded binding");
        };
        let info = client.info("test").await.unwrap();
        assert_eq!(info.data, "vigil");
        assert_eq!(info.last_block_height, 0);
    }

    #[tokio::test]
    async fn test_standalone_binding_serves_requests() {
        let mut config = Configuration::default();
        config.engine.embedded = false;
        config.engine.address = "tcp://127.0.0.1:0".to_string();
        let Binding::Standalone(handle) = bind(&config, app()).await.unwrap() else {
            panic!("expected standalone binding");
        };

        let client = SocketClient::connect(&handle.local_addr().to_string()).await.unwrap();
        let response = client
            .request(Request::Echo {
                message: "ping".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            response,
            Response::Echo {
                message: "ping".to_string()
            }
        );
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = listener.local_addr().unwrap();
        let mut config = Configuration::default();
        config.engine.embedded = false;
        config.engine.address = format!("tcp://{}", taken);
        let err = bind(&config, app()).await.unwrap_err();
        assert!(matches!(err, NodeError::TransportBindError { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_config_error() {
        let mut config = Configuration::default();
        config.engine.embedded = false;
        config.engine.address = "unix:///tmp/vigil.sock".to_string();
        let err = bind(&config, app()).await.unwrap_err();
        assert!(matches!(err, NodeError::ConfigError { .. }));
    }
}
