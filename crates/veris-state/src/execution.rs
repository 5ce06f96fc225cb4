//! The block executor: the deterministic state transition.
//!
//! `apply_block` drives one decided block through a strictly ordered
//! pipeline: validate, BeginBlock, DeliverTx per transaction, EndBlock,
//! diff validation, next-validator computation, state computation, Commit
//! under the mempool lock, persist, notify. Each stage's failure class is
//! documented on [`crate::errors::ExecutionError`].
//!
//! # Re-execution contract
//!
//! The executor is not re-entrant and does not honor cancellation
//! mid-height: once BeginBlock is sent, the pipeline runs to Commit or to a
//! fatal error. A crash after the application commit but before the state
//! save is recovered by re-running `apply_block` for the same height on
//! startup, so applications must make Commit idempotent at a given height.

use std::sync::Arc;

use veris_app::{
    AppConnConsensus, LastCommitInfo, RequestBeginBlock, RequestDeliverTx, RequestEndBlock,
    ResponseDeliverTx, VoteInfo,
};
use veris_crypto::hash_bytes;
use veris_types::{to_hex, Hash32};
use veris_wire::block::{Block, BlockId};
use veris_wire::io::WireEncode;

use crate::errors::{AppResponseError, ExecutionError};
use crate::event_bus::EventBus;
use crate::events::EventData;
use crate::evidence::EvidencePool;
use crate::mempool::Mempool;
use crate::state::State;
use crate::store::{AbciResponses, StateStore};
use crate::validation::{validate_block, validate_validator_updates, BlockValidationError};

/// Hash of a DeliverTx results vector. Feeds the next block's
/// `last_results_hash` header field.
pub fn hash_results(responses: &[ResponseDeliverTx]) -> Hash32 {
    let mut buf = Vec::new();
    veris_wire::io::put_u32(&mut buf, responses.len() as u32);
    for resp in responses {
        resp.encode(&mut buf);
    }
    hash_bytes(&buf)
}

/// Orchestrates stores, adapters, and the application connection to apply
/// decided blocks and advance the consensus state.
pub struct BlockExecutor {
    store: Arc<dyn StateStore>,
    app_conn: Arc<dyn AppConnConsensus>,
    mempool: Arc<dyn Mempool>,
    evidence_pool: Arc<dyn EvidencePool>,
    event_bus: Option<EventBus>,
}

impl BlockExecutor {
    pub fn new(
        store: Arc<dyn StateStore>,
        app_conn: Arc<dyn AppConnConsensus>,
        mempool: Arc<dyn Mempool>,
        evidence_pool: Arc<dyn EvidencePool>,
    ) -> Self {
        BlockExecutor {
            store,
            app_conn,
            mempool,
            evidence_pool,
            event_bus: None,
        }
    }

    /// Attach an event bus. Publication is best-effort; without a bus the
    /// executor runs silently.
    pub fn set_event_bus(&mut self, event_bus: EventBus) {
        self.event_bus = Some(event_bus);
    }

    /// Apply a decided block to `state`, returning the new state and the
    /// application's retain height.
    ///
    /// Not re-entrant; never invoked concurrently with itself. On error the
    /// caller's state is untouched.
    pub fn apply_block(
        &self,
        state: &State,
        block_id: &BlockId,
        block: &Block,
    ) -> Result<(State, u64), ExecutionError> {
        let height = block.header.height;

        // Stage A: structural validation against the current state, plus
        // the evidence pool's policy check on submitted evidence.
        validate_block(state, block)?;
        self.evidence_pool
            .check_evidence(&block.evidence)
            .map_err(|err| {
                ExecutionError::InvalidBlock(BlockValidationError::InvalidEvidence(
                    err.to_string(),
                ))
            })?;

        // Stages B-D: drive the application through its commit protocol.
        let (begin_response, deliver_responses, end_response) =
            self.exec_block_on_app(state, block)?;

        let abci_responses = AbciResponses {
            deliver_txs: deliver_responses.clone(),
            end_block: end_response.clone(),
        };
        self.store
            .save_abci_responses(height, &abci_responses)
            .map_err(ExecutionError::StateSave)?;

        // Stage E: the application's diffs must pass policy before any of
        // them touches the state.
        let validator_updates = &end_response.validator_updates;
        validate_validator_updates(validator_updates, &state.consensus_params.validator)
            .map_err(|err| ExecutionError::InvalidAppResponse(AppResponseError::InvalidUpdate(err)))?;

        let mut consensus_params = state.consensus_params.clone();
        let mut params_changed = false;
        if let Some(update) = &end_response.consensus_param_updates {
            consensus_params = consensus_params.update(update);
            consensus_params
                .validate()
                .map_err(|err| ExecutionError::InvalidAppResponse(AppResponseError::Params(err)))?;
            params_changed = true;
        }

        // Stage F: the look-ahead set advances one height, then absorbs the
        // diff. On failure the caller's `state.next_validators` is
        // untouched because all work happens on this clone.
        let mut next_validators = state.next_validators.clone();
        next_validators.increment_proposer_priority(1);
        next_validators
            .update_with_change_set(validator_updates)
            .map_err(|err| {
                ExecutionError::InvalidAppResponse(AppResponseError::ValidatorSet(err))
            })?;

        // Stage G: compute the new state. Nothing before this point has
        // mutated anything observable.
        let mut new_state = State {
            chain_id: state.chain_id.clone(),
            initial_height: state.initial_height,
            last_block_height: height,
            last_block_id: *block_id,
            last_block_time: block.header.time,
            last_validators: state.validators.clone(),
            validators: state.next_validators.clone(),
            next_validators,
            last_height_validators_changed: if validator_updates.is_empty() {
                state.last_height_validators_changed
            } else {
                // The diff takes effect two heights after this block.
                height + 1 + 1
            },
            consensus_params,
            last_height_consensus_params_changed: if params_changed {
                height + 1
            } else {
                state.last_height_consensus_params_changed
            },
            last_results_hash: hash_results(&deliver_responses),
            app_hash: Vec::new(),
            version: state.version.clone(),
        };
        if params_changed && new_state.consensus_params.version.app_version != 0 {
            new_state.version.consensus.app = new_state.consensus_params.version.app_version;
        }

        // Stage H: Commit, with the mempool locked from the start of the
        // commit until it has reconciled, so no CheckTx runs against the
        // outgoing state.
        self.mempool.lock();
        let commit_result = self
            .app_conn
            .commit()
            .map_err(ExecutionError::ProxyApp)
            .and_then(|resp| {
                self.mempool
                    .update(height, &block.data, &deliver_responses)
                    .map_err(ExecutionError::Mempool)?;
                Ok(resp)
            });
        self.mempool.unlock();
        let commit_response = commit_result?;

        new_state.app_hash = commit_response.data.clone();
        let retain_height = commit_response.retain_height;

        // Stage I: persist. Atomic at snapshot level: either the new
        // height is visible or the old one is.
        self.store
            .save(&new_state)
            .map_err(ExecutionError::StateSave)?;

        // Stage J: notify. Failures here never fail the block.
        self.evidence_pool.update(&new_state);
        if let Some(bus) = &self.event_bus {
            bus.publish(EventData::NewBlock {
                block: block.clone(),
                result_begin_block: begin_response,
                result_end_block: end_response.clone(),
            });
            bus.publish(EventData::NewBlockHeader {
                header: block.header.clone(),
                num_txs: block.data.len() as u64,
            });
            for (index, (tx, result)) in
                block.data.iter().zip(deliver_responses.iter()).enumerate()
            {
                bus.publish(EventData::Tx {
                    height,
                    index: index as u32,
                    tx: tx.clone(),
                    result: result.clone(),
                });
            }
            if !validator_updates.is_empty() {
                bus.publish(EventData::ValidatorSetUpdates {
                    updates: validator_updates.clone(),
                });
            }
        }

        eprintln!(
            "[INFO] executed block height={} txs={} app_hash={}",
            height,
            block.data.len(),
            to_hex(&new_state.app_hash)
        );

        Ok((new_state, retain_height))
    }

    /// Stages B-D: BeginBlock, the DeliverTx loop, EndBlock. One
    /// connection, call order preserved, responses correlated by position.
    fn exec_block_on_app(
        &self,
        state: &State,
        block: &Block,
    ) -> Result<
        (
            veris_app::ResponseBeginBlock,
            Vec<ResponseDeliverTx>,
            veris_app::ResponseEndBlock,
        ),
        ExecutionError,
    > {
        let height = block.header.height;

        // The commit report follows the order of the set that produced the
        // commit; validators whose votes never arrived are reported with
        // signed_last_block = false.
        let votes: Vec<VoteInfo> = state
            .last_validators
            .iter()
            .enumerate()
            .map(|(idx, validator)| VoteInfo {
                validator: veris_app::AbciValidator {
                    address: validator.address,
                    power: validator.voting_power,
                },
                signed_last_block: block
                    .last_commit
                    .signatures
                    .get(idx)
                    .is_some_and(|sig| sig.is_for_block()),
            })
            .collect();

        let begin_response = self.app_conn.begin_block(RequestBeginBlock {
            hash: block.hash(),
            header: block.header.clone(),
            last_commit_info: LastCommitInfo {
                round: block.last_commit.round,
                votes,
            },
            byzantine_validators: self.evidence_pool.abci_evidence(height, &block.evidence),
        })?;

        let mut deliver_responses = Vec::with_capacity(block.data.len());
        for tx in &block.data {
            let response = self.app_conn.deliver_tx(RequestDeliverTx { tx: tx.clone() })?;
            if !response.is_ok() {
                eprintln!(
                    "[WARN] invalid tx at height={} code={} log={}",
                    height, response.code, response.log
                );
            }
            deliver_responses.push(response);
        }

        let end_response = self.app_conn.end_block(RequestEndBlock { height })?;

        Ok((begin_response, deliver_responses, end_response))
    }
}

impl std::fmt::Debug for BlockExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockExecutor")
            .field("event_bus", &self.event_bus.is_some())
            .finish_non_exhaustive()
    }
}
