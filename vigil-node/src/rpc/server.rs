use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use jsonrpsee::server::ServerBuilder;

use super::handlers::{RpcContext, VigilRpcImpl, VigilRpcServer};
use crate::sidecar::{ReadySignal, Sidecar, SidecarError, StopToken};

const NAME: &str = "query-server";

/// JSON-RPC HTTP server over the application, run as a sidecar.
pub struct QueryServer {
    addr: String,
    ctx: RpcContext,
    bound: Arc<OnceLock<SocketAddr>>,
}

impl QueryServer {
    /// `addr` is `host:port`.
    pub fn new(addr: String, ctx: RpcContext) -> Self {
        Self {
            addr,
            ctx,
            bound: Arc::new(OnceLock::new()),
        }
    }

    /// Filled with the bound address once the server is listening.
    pub fn bound_addr(&self) -> Arc<OnceLock<SocketAddr>> {
        self.bound.clone()
    }
}

#[async_trait]
impl Sidecar for QueryServer {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn start(
        self: Box<Self>,
        ready: ReadySignal,
        mut stop: StopToken,
    ) -> Result<(), SidecarError> {
        let server = ServerBuilder::default()
            .build(&self.addr)
            .await
            .map_err(|e| SidecarError::Bind {
                name: NAME.to_string(),
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = server.local_addr().map_err(|e| SidecarError::Failed {
            name: NAME.to_string(),
            reason: e.to_string(),
        })?;
        let _ = self.bound.set(local_addr);

        let rpc_impl = VigilRpcImpl { ctx: self.ctx };
        let handle = server.start(rpc_impl.into_rpc());
        tracing::info!(addr = %local_addr, "query server started");
        ready.signal();

        stop.stopped().await;
        if handle.stop().is_err() {
            tracing::debug!("query server was already stopped");
        }
        handle.stopped().await;
        Ok(())
    }
}
