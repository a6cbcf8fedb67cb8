use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::application::{dispatch, Application};
use crate::codec::{read_frame, write_frame};
use crate::error::AbciError;
use crate::types::{
    Request, RequestBeginBlock, RequestInitChain, RequestQuery, Response, ResponseCommit,
    ResponseEndBlock, ResponseInfo, ResponseInitChain, ResponseQuery,
};

/// The engine's handle on the application, whatever the transport.
#[async_trait]
pub trait AppConnection: Send + Sync {
    async fn request(&self, request: Request) -> Result<Response, AbciError>;

    async fn info(&self, version: &str) -> Result<ResponseInfo, AbciError> {
        match self
            .request(Request::Info {
                version: version.to_string(),
            })
            .await?
        {
            Response::Info(info) => Ok(info),
            other => Err(unexpected("info", other)),
        }
    }

    async fn init_chain(&self, req: RequestInitChain) -> Result<ResponseInitChain, AbciError> {
        match self.request(Request::InitChain(req)).await? {
            Response::InitChain(res) => Ok(res),
            other => Err(unexpected("init_chain", other)),
        }
    }

    async fn begin_block(&self, req: RequestBeginBlock) -> Result<(), AbciError> {
        match self.request(Request::BeginBlock(req)).await? {
            Response::BeginBlock => Ok(()),
            other => Err(unexpected("begin_block", other)),
        }
    }

    async fn end_block(&self, height: u64) -> Result<ResponseEndBlock, AbciError> {
        match self.request(Request::EndBlock { height }).await? {
            Response::EndBlock(res) => Ok(res),
            other => Err(unexpected("end_block", other)),
        }
    }

    async fn commit(&self) -> Result<ResponseCommit, AbciError> {
        match self.request(Request::Commit).await? {
            Response::Commit(res) => Ok(res),
            other => Err(unexpected("commit", other)),
        }
    }

    async fn query(&self, req: RequestQuery) -> Result<ResponseQuery, AbciError> {
        match self.request(Request::Query(req)).await? {
            Response::Query(res) => Ok(res),
            other => Err(unexpected("query", other)),
        }
    }
}

fn unexpected(request: &str, response: Response) -> AbciError {
    match response {
        Response::Exception { error } => AbciError::Application { reason: error },
        other => AbciError::UnexpectedResponse {
            request: request.to_string(),
            response: other.kind().to_string(),
        },
    }
}

/// In-process binding: requests lock the application and call it directly.
pub struct LocalClient<A> {
    app: Arc<Mutex<A>>,
}

impl<A: Application> LocalClient<A> {
    pub fn new(app: A) -> Self {
        Self::from_shared(Arc::new(Mutex::new(app)))
    }

    pub fn from_shared(app: Arc<Mutex<A>>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> Arc<Mutex<A>> {
        self.app.clone()
    }
}

impl<A> Clone for LocalClient<A> {
    fn clone(&self) -> Self {
        Self {
            app: self.app.clone(),
        }
    }
}

#[async_trait]
impl<A: Application> AppConnection for LocalClient<A> {
    async fn request(&self, request: Request) -> Result<Response, AbciError> {
        let mut app = self.app.lock().await;
        Ok(dispatch(&mut *app, request))
    }
}

/// Remote binding over one TCP connection to a [`crate::server::SocketServer`].
pub struct SocketClient {
    stream: Mutex<TcpStream>,
}

impl SocketClient {
    pub async fn connect(addr: &str) -> Result<Self, AbciError> {
        let target = crate::server::parse_listen_addr(addr)?;
        let stream = TcpStream::connect(&target).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }
}

#[async_trait]
impl AppConnection for SocketClient {
    async fn request(&self, request: Request) -> Result<Response, AbciError> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, &request).await?;
        read_frame(&mut *stream)
            .await?
            .ok_or(AbciError::ConnectionClosed)
    }
}
