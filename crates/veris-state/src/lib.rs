//! Consensus state and the block execution pipeline.
//!
//! This crate owns the node's view of the chain: the [`State`] snapshot at a
//! height boundary, its durable [`store`], and the [`BlockExecutor`] that
//! rolls the state forward by driving a decided block through the
//! application's commit protocol.
//!
//! The executor is single-threaded per height and never re-entrant. State
//! mutation happens only after every validation has passed, and becomes
//! durable only when the store save succeeds; a crash anywhere in between is
//! recovered by re-running the same block on startup, which is why the
//! application's commit must be idempotent at a given height.

pub mod errors;
pub mod event_bus;
pub mod events;
pub mod evidence;
pub mod execution;
pub mod mempool;
pub mod state;
pub mod store;
pub mod validation;

pub use errors::{AppResponseError, ExecutionError};
pub use event_bus::{EventBus, Subscription, DEFAULT_SUBSCRIPTION_CAPACITY};
pub use events::{EventData, Query};
pub use evidence::{EvidencePool, EvidencePoolError, NoopEvidencePool};
pub use execution::{hash_results, BlockExecutor};
pub use mempool::{InMemoryMempool, Mempool, MempoolConfig, MempoolError, NoopMempool};
pub use state::{State, StateError};
pub use store::{AbciResponses, MemoryStateStore, StateStore, StoreError};
pub use validation::{
    validate_block, validate_validator_updates, BlockValidationError, InvalidUpdateError,
};
