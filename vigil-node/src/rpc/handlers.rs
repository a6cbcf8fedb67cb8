use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use tokio::sync::watch;
use vigil_abci::types::RequestQuery;
use vigil_abci::AppConnection;
use vigil_types::PublicKey;

use super::types::{AppInfo, HealthInfo, NodeInfo, QueryResult, ValidatorInfo};
use crate::metrics::NodeMetrics;
use crate::node::LifecycleState;

const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC trait for the Vigil query server.
#[rpc(server)]
pub trait VigilRpc {
    /// Health check endpoint.
    #[method(name = "vigil_health")]
    async fn health(&self) -> Result<HealthInfo, ErrorObjectOwned>;

    /// Node ID, chain and engine wiring.
    #[method(name = "vigil_nodeInfo")]
    async fn node_info(&self) -> Result<NodeInfo, ErrorObjectOwned>;

    /// The validator identity of this node.
    #[method(name = "vigil_validator")]
    async fn validator(&self) -> Result<ValidatorInfo, ErrorObjectOwned>;

    /// Application name, version and last committed block.
    #[method(name = "vigil_appInfo")]
    async fn app_info(&self) -> Result<AppInfo, ErrorObjectOwned>;

    /// Query the application. `data` is hex; `height` 0 or absent means latest.
    #[method(name = "vigil_query")]
    async fn query(
        &self,
        path: String,
        data: Option<String>,
        height: Option<u64>,
    ) -> Result<QueryResult, ErrorObjectOwned>;

    /// Prometheus text exposition of the node metrics.
    #[method(name = "vigil_metrics")]
    async fn metrics(&self) -> Result<String, ErrorObjectOwned>;
}

/// State shared by the query handlers.
#[derive(Clone)]
pub struct RpcContext {
    pub connection: Arc<dyn AppConnection>,
    pub node_id: String,
    pub chain_id: String,
    pub pub_key: PublicKey,
    pub embedded_engine: bool,
    pub metrics: Arc<NodeMetrics>,
    pub lifecycle: watch::Receiver<LifecycleState>,
}

/// JSON-RPC implementation.
pub struct VigilRpcImpl {
    pub ctx: RpcContext,
}

fn internal(e: impl std::fmt::Display) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(INTERNAL_ERROR, e.to_string(), None::<()>)
}

#[async_trait]
impl VigilRpcServer for VigilRpcImpl {
    async fn health(&self) -> Result<HealthInfo, ErrorObjectOwned> {
        let state = *self.ctx.lifecycle.borrow();
        let status = if state == LifecycleState::Running {
            "ok".to_string()
        } else {
            state.to_string()
        };
        Ok(HealthInfo {
            status,
            lifecycle: state.to_string(),
            height: self.ctx.metrics.app_height.get().max(0) as u64,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    async fn node_info(&self) -> Result<NodeInfo, ErrorObjectOwned> {
        Ok(NodeInfo {
            node_id: self.ctx.node_id.clone(),
            chain_id: self.ctx.chain_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            embedded_engine: self.ctx.embedded_engine,
        })
    }

    async fn validator(&self) -> Result<ValidatorInfo, ErrorObjectOwned> {
        Ok(ValidatorInfo {
            address: self.ctx.pub_key.address().to_string(),
            pub_key: self.ctx.pub_key.to_string(),
        })
    }

    async fn app_info(&self) -> Result<AppInfo, ErrorObjectOwned> {
        let info = self
            .ctx
            .connection
            .info(env!("CARGO_PKG_VERSION"))
            .await
            .map_err(internal)?;
        Ok(AppInfo {
            name: info.data,
            version: info.version,
            last_block_height: info.last_block_height,
            last_block_app_hash: hex::encode(info.last_block_app_hash),
        })
    }

    async fn query(
        &self,
        path: String,
        data: Option<String>,
        height: Option<u64>,
    ) -> Result<QueryResult, ErrorObjectOwned> {
        let data = match data {
            Some(hex_str) => {
                let trimmed = vigil_types::primitives::strip_hex_prefix(&hex_str);
                hex::decode(trimmed).map_err(|e| {
                    ErrorObjectOwned::owned(
                        INVALID_PARAMS,
                        format!("invalid hex data: {}", e),
                        None::<()>,
                    )
                })?
            }
            None => Vec::new(),
        };
        let res = self
            .ctx
            .connection
            .query(RequestQuery {
                path,
                data,
                height: height.unwrap_or(0),
            })
            .await
            .map_err(internal)?;
        Ok(QueryResult {
            code: res.code,
            log: res.log,
            key: hex::encode(res.key),
            value: hex::encode(res.value),
            height: res.height,
        })
    }

    async fn metrics(&self) -> Result<String, ErrorObjectOwned> {
        Ok(self.ctx.metrics.encode())
    }
}
