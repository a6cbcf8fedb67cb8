use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::application::{dispatch, Application};
use crate::codec::{read_frame, write_frame};
use crate::error::AbciError;
use crate::types::Request;

/// Normalize a listen address to `host:port`.
///
/// Accepts `tcp://host:port` and bare `host:port`. Any other scheme is rejected.
pub fn parse_listen_addr(addr: &str) -> Result<String, AbciError> {
    let invalid = |reason: &str| AbciError::InvalidAddress {
        addr: addr.to_string(),
        reason: reason.to_string(),
    };
    let host_port = match addr.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some((scheme, _)) => return Err(invalid(&format!("scheme '{}' is not supported", scheme))),
        None => addr,
    };
    let (host, port) = host_port
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
    Ok(host_port.to_string())
}

/// TCP server for the standalone binding. Serves one engine connection at a time.
pub struct SocketServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SocketServer {
    /// Bind the listen address. Failure here is fatal for the caller.
    pub async fn bind(addr: &str) -> Result<Self, AbciError> {
        let target = parse_listen_addr(addr)?;
        let listener = TcpListener::bind(&target)
            .await
            .map_err(|e| AbciError::Bind {
                addr: target.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start accepting connections on a background task.
    pub fn spawn<A: Application>(self, app: Arc<Mutex<A>>) -> SocketServerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let local_addr = self.local_addr;
        let task = tokio::spawn(accept_loop(self.listener, app, stop_rx));
        tracing::info!(addr = %local_addr, "application socket server listening");
        SocketServerHandle {
            stop_tx,
            task,
            local_addr,
        }
    }
}

/// Running socket server.
pub struct SocketServerHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl SocketServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drop the current connection and wait for the task.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("socket server task ended abnormally: {}", e);
        }
        tracing::info!(addr = %self.local_addr, "application socket server stopped");
    }
}

async fn accept_loop<A: Application>(
    listener: TcpListener,
    app: Arc<Mutex<A>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop_rx.changed() => return,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("accept failed: {}", e);
                        continue;
                    }
                };
                tracing::info!(peer = %peer, "engine connected");
                tokio::select! {
                    _ = stop_rx.changed() => return,
                    result = serve_connection(stream, &app) => match result {
                        Ok(()) => tracing::info!(peer = %peer, "engine disconnected"),
                        Err(e) => tracing::warn!(peer = %peer, "engine connection failed: {}", e),
                    }
                }
            }
        }
    }
}

async fn serve_connection<A: Application>(
    mut stream: TcpStream,
    app: &Arc<Mutex<A>>,
) -> Result<(), AbciError> {
    stream.set_nodelay(true)?;
    while let Some(request) = read_frame::<_, Request>(&mut stream).await? {
        let response = {
            let mut app = app.lock().await;
            dispatch(&mut *app, request)
        };
        write_frame(&mut stream, &response).await?;
    }
    Ok(())
}
