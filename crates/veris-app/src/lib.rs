//! The application protocol: the transport-agnostic channel between the
//! consensus node and the state machine it replicates.
//!
//! The node drives the application through a fixed request/response
//! vocabulary (BeginBlock, DeliverTx, EndBlock, Commit, CheckTx). This crate
//! defines those messages, the [`Application`] trait state machines
//! implement, and two connection flavors:
//!
//! - [`LocalAppConn`]: direct, mutex-serialized dispatch to an in-process
//!   application;
//! - [`ChannelAppConn`]: a worker thread owning the application, fed through
//!   a single FIFO channel, so responses correlate with requests by
//!   position.
//!
//! Both uphold the ordering contract the executor depends on: within one
//! height, BeginBlock precedes every DeliverTx, DeliverTx order matches
//! block order, EndBlock follows all DeliverTx, and Commit follows EndBlock.

pub mod conn;
pub mod types;

pub use conn::{AppConnConsensus, AppConnError, AppConnMempool, ChannelAppConn, LocalAppConn};
pub use types::{
    AbciEvent, AbciEvidence, AbciEvidenceKind, AbciValidator, Application, CheckTxKind,
    LastCommitInfo, RequestBeginBlock, RequestCheckTx, RequestDeliverTx, RequestEndBlock,
    ResponseBeginBlock, ResponseCheckTx, ResponseCommit, ResponseDeliverTx, ResponseEndBlock,
    VoteInfo,
};
