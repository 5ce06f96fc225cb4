//! The consensus state snapshot.
//!
//! `State` is the node's consensus-relevant view at a height boundary. It
//! carries three validator sets at once:
//!
//! - `last_validators`: active at `last_block_height`, needed to attribute
//!   the next block's LastCommit signatures;
//! - `validators`: active at `last_block_height + 1`, used for proposer
//!   selection and commit verification at that height;
//! - `next_validators`: active at `last_block_height + 2`, the set the
//!   application's EndBlock diffs operate on.
//!
//! Collapsing any two of them breaks either commit attribution or the
//! one-height look-ahead of validator changes, so all three are persisted.

use veris_consensus::{ConsensusParams, ValidatorSet};
use veris_crypto::hash_bytes;
use veris_types::{ConsensusVersion, Hash32, StateVersion, Time, MAX_CHAIN_ID_LEN};
use veris_wire::block::{hash_evidence, hash_txs, Block, BlockId, Commit, Evidence, Header, Tx};
use veris_wire::io::{
    get_hash32, get_i64, get_string, get_u64, get_var_bytes, put_bytes, put_i64, put_string,
    put_u64, put_var_bytes, WireDecode, WireEncode,
};
use veris_wire::WireError;

// ============================================================================
// State
// ============================================================================

/// The node's consensus-relevant view at a height boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    /// Opaque chain identity; immutable for the life of the chain.
    pub chain_id: String,
    /// First block height of this chain (1 or later).
    pub initial_height: u64,

    /// Height of the last applied block; 0 before any block.
    pub last_block_height: u64,
    pub last_block_id: BlockId,
    pub last_block_time: Time,

    /// Set active at `last_block_height + 1`.
    pub validators: ValidatorSet,
    /// Set active at `last_block_height + 2`.
    pub next_validators: ValidatorSet,
    /// Set active at `last_block_height`. Empty only at genesis.
    pub last_validators: ValidatorSet,
    /// Height at which `validators` last differed from its predecessor.
    pub last_height_validators_changed: u64,

    pub consensus_params: ConsensusParams,
    pub last_height_consensus_params_changed: u64,

    /// Hash of the previous block's DeliverTx results.
    pub last_results_hash: Hash32,
    /// Application state hash after the last applied block.
    pub app_hash: Vec<u8>,

    pub version: StateVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    EmptyChainId,
    ChainIdTooLong(usize),
    ZeroInitialHeight,
    EmptyValidators,
    EmptyNextValidators,
    /// `last_validators` may be empty only before the first block.
    MissingLastValidators { last_block_height: u64 },
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::EmptyChainId => write!(f, "chain id is empty"),
            StateError::ChainIdTooLong(len) => {
                write!(f, "chain id length {} exceeds {}", len, MAX_CHAIN_ID_LEN)
            }
            StateError::ZeroInitialHeight => write!(f, "initial height must be 1 or later"),
            StateError::EmptyValidators => write!(f, "validator set is empty"),
            StateError::EmptyNextValidators => write!(f, "next validator set is empty"),
            StateError::MissingLastValidators { last_block_height } => write!(
                f,
                "last validators empty at height {}",
                last_block_height
            ),
        }
    }
}

impl std::error::Error for StateError {}

impl State {
    /// Build the height-0 state of a fresh chain.
    ///
    /// `last_validators` starts empty: there is no predecessor set to
    /// attribute a first commit to. `next_validators` is the same set with
    /// its proposer schedule advanced one round, reflecting the one-height
    /// look-ahead.
    pub fn genesis(
        chain_id: impl Into<String>,
        initial_height: u64,
        genesis_time: Time,
        validators: ValidatorSet,
        consensus_params: ConsensusParams,
        app_hash: Vec<u8>,
    ) -> Result<State, StateError> {
        let chain_id = chain_id.into();
        let next_validators = validators.copy_increment_proposer_priority(1);
        let state = State {
            chain_id,
            initial_height,
            last_block_height: 0,
            last_block_id: BlockId::default(),
            last_block_time: genesis_time,
            validators,
            next_validators,
            last_validators: ValidatorSet::empty(),
            last_height_validators_changed: initial_height,
            consensus_params,
            last_height_consensus_params_changed: initial_height,
            last_results_hash: crate::execution::hash_results(&[]),
            app_hash,
            version: StateVersion::current(),
        };
        state.validate()?;
        Ok(state)
    }

    /// Check the snapshot invariants. Holds before and after every applied
    /// block.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.chain_id.is_empty() {
            return Err(StateError::EmptyChainId);
        }
        if self.chain_id.len() > MAX_CHAIN_ID_LEN {
            return Err(StateError::ChainIdTooLong(self.chain_id.len()));
        }
        if self.initial_height == 0 {
            return Err(StateError::ZeroInitialHeight);
        }
        if self.validators.is_empty() {
            return Err(StateError::EmptyValidators);
        }
        if self.next_validators.is_empty() {
            return Err(StateError::EmptyNextValidators);
        }
        if self.last_validators.is_empty() && self.last_block_height != 0 {
            return Err(StateError::MissingLastValidators {
                last_block_height: self.last_block_height,
            });
        }
        Ok(())
    }

    /// The height the next block must have.
    pub fn next_height(&self) -> u64 {
        if self.last_block_height == 0 {
            self.initial_height
        } else {
            self.last_block_height + 1
        }
    }

    /// Build a block on top of this state. The header commits to the
    /// state's validator sets, parameters, app hash, and results hash, so
    /// the result passes structural validation against this state.
    pub fn make_block(
        &self,
        height: u64,
        time: Time,
        txs: Vec<Tx>,
        evidence: Vec<Evidence>,
        last_commit: Commit,
    ) -> Block {
        let proposer_address = self
            .validators
            .proposer()
            .map(|v| v.address)
            .unwrap_or_default();
        let header = Header {
            version: ConsensusVersion {
                block: self.version.consensus.block,
                app: self.version.consensus.app,
            },
            chain_id: self.chain_id.clone(),
            height,
            time,
            last_block_id: self.last_block_id,
            last_commit_hash: last_commit.hash(),
            data_hash: hash_txs(&txs),
            validators_hash: self.validators.hash(),
            next_validators_hash: self.next_validators.hash(),
            consensus_hash: self.consensus_params.hash(),
            app_hash: self.app_hash.clone(),
            last_results_hash: self.last_results_hash,
            evidence_hash: hash_evidence(&evidence),
            proposer_address,
        };
        Block {
            header,
            data: txs,
            evidence,
            last_commit,
        }
    }
}

// ============================================================================
// Wire encoding (persistence)
// ============================================================================

impl WireEncode for State {
    fn encode(&self, out: &mut Vec<u8>) {
        put_string(out, &self.chain_id);
        put_u64(out, self.initial_height);
        put_u64(out, self.last_block_height);
        self.last_block_id.encode(out);
        put_i64(out, self.last_block_time.as_unix_nanos());
        self.validators.encode(out);
        self.next_validators.encode(out);
        self.last_validators.encode(out);
        put_u64(out, self.last_height_validators_changed);
        self.consensus_params.encode(out);
        put_u64(out, self.last_height_consensus_params_changed);
        put_bytes(out, &self.last_results_hash);
        put_var_bytes(out, &self.app_hash);
        put_u64(out, self.version.consensus.block);
        put_u64(out, self.version.consensus.app);
        put_string(out, &self.version.software);
    }
}

impl WireDecode for State {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let chain_id = get_string(input, MAX_CHAIN_ID_LEN)?;
        let initial_height = get_u64(input)?;
        let last_block_height = get_u64(input)?;
        let last_block_id = BlockId::decode(input)?;
        let last_block_time = Time::from_unix_nanos(get_i64(input)?);
        let validators = ValidatorSet::decode(input)?;
        let next_validators = ValidatorSet::decode(input)?;
        let last_validators = ValidatorSet::decode(input)?;
        let last_height_validators_changed = get_u64(input)?;
        let consensus_params = ConsensusParams::decode(input)?;
        let last_height_consensus_params_changed = get_u64(input)?;
        let last_results_hash = get_hash32(input)?;
        let app_hash = get_var_bytes(input, 256)?;
        let version = StateVersion {
            consensus: ConsensusVersion {
                block: get_u64(input)?,
                app: get_u64(input)?,
            },
            software: get_string(input, 64)?,
        };
        Ok(State {
            chain_id,
            initial_height,
            last_block_height,
            last_block_id,
            last_block_time,
            validators,
            next_validators,
            last_validators,
            last_height_validators_changed,
            consensus_params,
            last_height_consensus_params_changed,
            last_results_hash,
            app_hash,
            version,
        })
    }
}

/// Identity of a state snapshot for logs: hash of its persisted form.
pub fn state_fingerprint(state: &State) -> Hash32 {
    hash_bytes(&state.encode_to_vec())
}
