//! Application connections: how the node talks to the state machine.
//!
//! The executor owns one consensus connection exclusively for the duration
//! of a block; the mempool uses a separate connection handle for CheckTx.
//! Both connection flavors here serialize all requests, so the application
//! never observes interleaved methods.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;

use crate::types::{
    Application, RequestBeginBlock, RequestCheckTx, RequestDeliverTx, RequestEndBlock,
    ResponseBeginBlock, ResponseCheckTx, ResponseCommit, ResponseDeliverTx, ResponseEndBlock,
};

/// Transport failure talking to the application. Fatal to the node: a
/// half-executed block cannot be reconciled with an unreachable app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppConnError {
    /// The connection (or its worker) is gone.
    Disconnected(String),
}

impl std::fmt::Display for AppConnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppConnError::Disconnected(msg) => write!(f, "application connection lost: {}", msg),
        }
    }
}

impl std::error::Error for AppConnError {}

/// The consensus-side connection: the block execution vocabulary.
pub trait AppConnConsensus: Send + Sync {
    fn begin_block(&self, req: RequestBeginBlock) -> Result<ResponseBeginBlock, AppConnError>;
    fn deliver_tx(&self, req: RequestDeliverTx) -> Result<ResponseDeliverTx, AppConnError>;
    fn end_block(&self, req: RequestEndBlock) -> Result<ResponseEndBlock, AppConnError>;
    fn commit(&self) -> Result<ResponseCommit, AppConnError>;
}

/// The mempool-side connection: transaction admission.
pub trait AppConnMempool: Send + Sync {
    fn check_tx(&self, req: RequestCheckTx) -> Result<ResponseCheckTx, AppConnError>;
}

// ============================================================================
// LocalAppConn
// ============================================================================

/// Direct dispatch to an in-process application behind a mutex.
///
/// The mutex is the whole transport: every call locks, dispatches, and
/// returns, so ordering follows call order and the app sees one request at a
/// time. Clones share the same application.
#[derive(Clone)]
pub struct LocalAppConn {
    app: Arc<Mutex<dyn Application>>,
}

impl LocalAppConn {
    pub fn new<A: Application + 'static>(app: A) -> Self {
        LocalAppConn {
            app: Arc::new(Mutex::new(app)),
        }
    }

    /// Run a closure against the application, for test inspection.
    pub fn with_app<R>(&self, f: impl FnOnce(&mut dyn Application) -> R) -> R {
        let mut app = self.app.lock();
        f(&mut *app)
    }
}

impl AppConnConsensus for LocalAppConn {
    fn begin_block(&self, req: RequestBeginBlock) -> Result<ResponseBeginBlock, AppConnError> {
        Ok(self.app.lock().begin_block(req))
    }

    fn deliver_tx(&self, req: RequestDeliverTx) -> Result<ResponseDeliverTx, AppConnError> {
        Ok(self.app.lock().deliver_tx(req))
    }

    fn end_block(&self, req: RequestEndBlock) -> Result<ResponseEndBlock, AppConnError> {
        Ok(self.app.lock().end_block(req))
    }

    fn commit(&self) -> Result<ResponseCommit, AppConnError> {
        Ok(self.app.lock().commit())
    }
}

impl AppConnMempool for LocalAppConn {
    fn check_tx(&self, req: RequestCheckTx) -> Result<ResponseCheckTx, AppConnError> {
        Ok(self.app.lock().check_tx(req))
    }
}

impl std::fmt::Debug for LocalAppConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAppConn").finish_non_exhaustive()
    }
}

// ============================================================================
// ChannelAppConn
// ============================================================================

enum AppRequest {
    BeginBlock(RequestBeginBlock),
    DeliverTx(RequestDeliverTx),
    EndBlock(RequestEndBlock),
    Commit,
    CheckTx(RequestCheckTx),
}

enum AppResponse {
    BeginBlock(ResponseBeginBlock),
    DeliverTx(ResponseDeliverTx),
    EndBlock(ResponseEndBlock),
    Commit(ResponseCommit),
    CheckTx(ResponseCheckTx),
}

/// Capacity of the request channel. Bounded so a stalled application
/// exerts backpressure on the caller instead of buffering a whole block.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// A connection that runs the application on its own worker thread, fed
/// through a single FIFO channel.
///
/// All requests travel the same channel, so responses correlate with
/// requests purely by position; there are no request ids. Dropping the last
/// clone closes the channel and stops the worker.
#[derive(Clone)]
pub struct ChannelAppConn {
    request_tx: Sender<(AppRequest, Sender<AppResponse>)>,
}

impl ChannelAppConn {
    /// Spawn the worker thread owning `app` and return the connection.
    pub fn spawn<A: Application + 'static>(app: A) -> Self {
        let (request_tx, request_rx) =
            bounded::<(AppRequest, Sender<AppResponse>)>(REQUEST_CHANNEL_CAPACITY);
        thread::spawn(move || {
            let mut app = app;
            while let Ok((request, reply_tx)) = request_rx.recv() {
                let response = match request {
                    AppRequest::BeginBlock(req) => AppResponse::BeginBlock(app.begin_block(req)),
                    AppRequest::DeliverTx(req) => AppResponse::DeliverTx(app.deliver_tx(req)),
                    AppRequest::EndBlock(req) => AppResponse::EndBlock(app.end_block(req)),
                    AppRequest::Commit => AppResponse::Commit(app.commit()),
                    AppRequest::CheckTx(req) => AppResponse::CheckTx(app.check_tx(req)),
                };
                // A caller that gave up mid-call is not an error for the
                // worker; keep serving.
                let _ = reply_tx.send(response);
            }
        });
        ChannelAppConn { request_tx }
    }

    fn roundtrip(&self, request: AppRequest) -> Result<AppResponse, AppConnError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.request_tx
            .send((request, reply_tx))
            .map_err(|_| AppConnError::Disconnected("app worker stopped".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| AppConnError::Disconnected("app worker dropped reply".to_string()))
    }
}

impl AppConnConsensus for ChannelAppConn {
    fn begin_block(&self, req: RequestBeginBlock) -> Result<ResponseBeginBlock, AppConnError> {
        match self.roundtrip(AppRequest::BeginBlock(req))? {
            AppResponse::BeginBlock(resp) => Ok(resp),
            _ => Err(AppConnError::Disconnected("response out of order".to_string())),
        }
    }

    fn deliver_tx(&self, req: RequestDeliverTx) -> Result<ResponseDeliverTx, AppConnError> {
        match self.roundtrip(AppRequest::DeliverTx(req))? {
            AppResponse::DeliverTx(resp) => Ok(resp),
            _ => Err(AppConnError::Disconnected("response out of order".to_string())),
        }
    }

    fn end_block(&self, req: RequestEndBlock) -> Result<ResponseEndBlock, AppConnError> {
        match self.roundtrip(AppRequest::EndBlock(req))? {
            AppResponse::EndBlock(resp) => Ok(resp),
            _ => Err(AppConnError::Disconnected("response out of order".to_string())),
        }
    }

    fn commit(&self) -> Result<ResponseCommit, AppConnError> {
        match self.roundtrip(AppRequest::Commit)? {
            AppResponse::Commit(resp) => Ok(resp),
            _ => Err(AppConnError::Disconnected("response out of order".to_string())),
        }
    }
}

impl AppConnMempool for ChannelAppConn {
    fn check_tx(&self, req: RequestCheckTx) -> Result<ResponseCheckTx, AppConnError> {
        match self.roundtrip(AppRequest::CheckTx(req))? {
            AppResponse::CheckTx(resp) => Ok(resp),
            _ => Err(AppConnError::Disconnected("response out of order".to_string())),
        }
    }
}

impl std::fmt::Debug for ChannelAppConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelAppConn").finish_non_exhaustive()
    }
}
