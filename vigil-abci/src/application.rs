use crate::error::AbciError;
use crate::types::{
    Request, RequestBeginBlock, RequestInitChain, RequestQuery, Response, ResponseCommit,
    ResponseDeliverTx, ResponseEndBlock, ResponseInfo, ResponseInitChain, ResponseQuery,
};

/// The application state machine driven by the consensus engine.
///
/// Calls arrive one at a time, in the order the engine issues them.
pub trait Application: Send + 'static {
    fn info(&self, version: &str) -> ResponseInfo;

    fn init_chain(&mut self, req: RequestInitChain) -> Result<ResponseInitChain, AbciError>;

    fn begin_block(&mut self, req: RequestBeginBlock) -> Result<(), AbciError>;

    fn deliver_tx(&mut self, tx: &[u8]) -> ResponseDeliverTx;

    fn end_block(&mut self, height: u64) -> Result<ResponseEndBlock, AbciError>;

    fn commit(&mut self) -> Result<ResponseCommit, AbciError>;

    fn query(&self, req: RequestQuery) -> ResponseQuery;
}

/// Route one request to the application. Errors become `Response::Exception`.
pub fn dispatch<A: Application + ?Sized>(app: &mut A, request: Request) -> Response {
    let kind = request.kind();
    let result = match request {
        Request::Echo { message } => Ok(Response::Echo { message }),
        Request::Flush => Ok(Response::Flush),
        Request::Info { version } => Ok(Response::Info(app.info(&version))),
        Request::InitChain(req) => app.init_chain(req).map(Response::InitChain),
        Request::BeginBlock(req) => app.begin_block(req).map(|_| Response::BeginBlock),
        Request::DeliverTx { tx } => Ok(Response::DeliverTx(app.deliver_tx(&tx))),
        Request::EndBlock { height } => app.end_block(height).map(Response::EndBlock),
        Request::Commit => app.commit().map(Response::Commit),
        Request::Query(req) => Ok(Response::Query(app.query(req))),
    };
    result.unwrap_or_else(|e| {
        tracing::warn!(request = kind, "application returned an error: {}", e);
        Response::Exception {
            error: e.to_string(),
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Counts blocks; refuses to commit past `fail_at`.
    #[derive(Default)]
    pub struct CounterApp {
        pub height: u64,
        pub txs: u64,
        pub fail_at: Option<u64>,
    }

    impl Application for CounterApp {
        fn info(&self, version: &str) -> ResponseInfo {
            ResponseInfo {
                data: "counter".to_string(),
                version: version.to_string(),
                last_block_height: self.height,
                last_block_app_hash: self.height.to_be_bytes().to_vec(),
            }
        }

        fn init_chain(&mut self, _req: RequestInitChain) -> Result<ResponseInitChain, AbciError> {
            Ok(ResponseInitChain::default())
        }

        fn begin_block(&mut self, req: RequestBeginBlock) -> Result<(), AbciError> {
            self.height = req.height;
            Ok(())
        }

        fn deliver_tx(&mut self, _tx: &[u8]) -> ResponseDeliverTx {
            self.txs += 1;
            ResponseDeliverTx::default()
        }

        fn end_block(&mut self, _height: u64) -> Result<ResponseEndBlock, AbciError> {
            Ok(ResponseEndBlock::default())
        }

        fn commit(&mut self) -> Result<ResponseCommit, AbciError> {
            if self.fail_at.is_some_and(|h| self.height >= h) {
                return Err(AbciError::Application {
                    reason: format!("halt at {}", self.height),
                });
            }
            Ok(ResponseCommit {
                data: self.height.to_be_bytes().to_vec(),
                retain_height: 0,
            })
        }

        fn query(&self, req: RequestQuery) -> ResponseQuery {
            ResponseQuery {
                key: req.data,
                value: self.txs.to_be_bytes().to_vec(),
                height: self.height,
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_echo_and_flush_do_not_touch_app() {
        let mut app = CounterApp::default();
        assert_eq!(
            dispatch(&mut app, Request::Echo { message: "hi".into() }),
            Response::Echo { message: "hi".into() }
        );
        assert_eq!(dispatch(&mut app, Request::Flush), Response::Flush);
        assert_eq!(app.txs, 0);
    }

    #[test]
    fn test_error_becomes_exception() {
        let mut app = CounterApp {
            height: 5,
            fail_at: Some(5),
            ..Default::default()
        };
        match dispatch(&mut app, Request::Commit) {
            Response::Exception { error } => assert!(error.contains("halt at 5")),
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_deliver_tx_reaches_app() {
        let mut app = CounterApp::default();
        dispatch(&mut app, Request::DeliverTx { tx: vec![1] });
        dispatch(&mut app, Request::DeliverTx { tx: vec![2] });
        assert_eq!(app.txs, 2);
    }
}
