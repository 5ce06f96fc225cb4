//! Durable storage of the consensus state.
//!
//! # Key layout
//!
//! - State: `state` → serialized [`State`]
//! - Per-height app responses: `abci_responses:<h>` → [`AbciResponses`]
//! - Per-height validators: `validators:<h>` → [`ValidatorSet`]
//! - Per-height parameters: `consensus_params:<h>` → [`ConsensusParams`]
//!
//! A `save` writes the state key plus the per-height keys for the heights
//! the snapshot determines, inside one critical section: either the new
//! height is visible in full or the old one is. Serialization is the wire
//! encoding, the same codec the rest of the node speaks.

use std::collections::HashMap;

use parking_lot::RwLock;

use veris_app::{ResponseDeliverTx, ResponseEndBlock};
use veris_consensus::{ConsensusParams, ConsensusParamsUpdate, ValidatorSet, ValidatorUpdate};
use veris_crypto::PublicKey;
use veris_wire::io::{
    get_i64, get_u32, get_u8, get_var_bytes, put_i64, put_u32, put_u8, put_var_bytes, WireDecode,
    WireEncode,
};
use veris_wire::WireError;

use crate::state::State;

// ============================================================================
// StoreError
// ============================================================================

/// Error type for store operations. Non-leaky: backends map their native
/// failures into these variants.
#[derive(Debug)]
pub enum StoreError {
    /// I/O or database failure.
    Io(String),
    /// Stored bytes did not decode.
    Codec(WireError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(msg) => write!(f, "store I/O error: {}", msg),
            StoreError::Codec(err) => write!(f, "store codec error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<WireError> for StoreError {
    fn from(err: WireError) -> Self {
        StoreError::Codec(err)
    }
}

// ============================================================================
// AbciResponses
// ============================================================================

/// The deterministic application responses for one height, persisted so a
/// crash between commit and save can be audited and replayed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AbciResponses {
    pub deliver_txs: Vec<ResponseDeliverTx>,
    pub end_block: ResponseEndBlock,
}

fn put_validator_update(out: &mut Vec<u8>, update: &ValidatorUpdate) {
    put_var_bytes(out, update.pub_key.as_bytes());
    put_i64(out, update.power);
}

fn get_validator_update(input: &mut &[u8]) -> Result<ValidatorUpdate, WireError> {
    let key_bytes = get_var_bytes(input, veris_crypto::PUBLIC_KEY_SIZE)?;
    let pub_key = PublicKey::from_bytes(&key_bytes)
        .map_err(|_| WireError::InvalidValue("bad update key"))?;
    let power = get_i64(input)?;
    Ok(ValidatorUpdate { pub_key, power })
}

impl WireEncode for AbciResponses {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.deliver_txs.len() as u32);
        for resp in &self.deliver_txs {
            resp.encode(out);
        }
        put_u32(out, self.end_block.validator_updates.len() as u32);
        for update in &self.end_block.validator_updates {
            put_validator_update(out, update);
        }
        match &self.end_block.consensus_param_updates {
            Some(update) => {
                put_u8(out, 1);
                update.encode(out);
            }
            None => put_u8(out, 0),
        }
    }
}

impl WireDecode for AbciResponses {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let tx_count = get_u32(input)? as usize;
        let mut deliver_txs = Vec::with_capacity(tx_count.min(1024));
        for _ in 0..tx_count {
            deliver_txs.push(ResponseDeliverTx::decode(input)?);
        }
        let update_count = get_u32(input)? as usize;
        let mut validator_updates = Vec::with_capacity(update_count.min(1024));
        for _ in 0..update_count {
            validator_updates.push(get_validator_update(input)?);
        }
        let consensus_param_updates = match get_u8(input)? {
            0 => None,
            1 => Some(ConsensusParamsUpdate::decode(input)?),
            _ => return Err(WireError::InvalidValue("bad param update flag")),
        };
        Ok(AbciResponses {
            deliver_txs,
            end_block: ResponseEndBlock {
                validator_updates,
                consensus_param_updates,
                events: Vec::new(),
            },
        })
    }
}

// ============================================================================
// StateStore trait
// ============================================================================

/// Durable load/save of the consensus state snapshot and its per-height
/// companions.
pub trait StateStore: Send + Sync {
    /// Load the latest state, or `None` on a fresh store.
    fn load(&self) -> Result<Option<State>, StoreError>;

    /// Persist a state snapshot atomically, together with the validator
    /// sets and parameters it determines for upcoming heights.
    fn save(&self, state: &State) -> Result<(), StoreError>;

    fn save_abci_responses(&self, height: u64, responses: &AbciResponses)
        -> Result<(), StoreError>;

    fn load_abci_responses(&self, height: u64) -> Result<Option<AbciResponses>, StoreError>;

    /// The validator set active at `height`, if recorded.
    fn load_validators(&self, height: u64) -> Result<Option<ValidatorSet>, StoreError>;

    /// The consensus parameters active at `height`, if recorded.
    fn load_consensus_params(&self, height: u64) -> Result<Option<ConsensusParams>, StoreError>;
}

fn state_key() -> Vec<u8> {
    b"state".to_vec()
}

fn abci_responses_key(height: u64) -> Vec<u8> {
    format!("abci_responses:{}", height).into_bytes()
}

fn validators_key(height: u64) -> Vec<u8> {
    format!("validators:{}", height).into_bytes()
}

fn consensus_params_key(height: u64) -> Vec<u8> {
    format!("consensus_params:{}", height).into_bytes()
}

// ============================================================================
// MemoryStateStore
// ============================================================================

/// In-memory store. The reference implementation of the trait contract;
/// production deployments plug a persistent backend behind the same trait.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, for tests.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<State>, StoreError> {
        let guard = self.inner.read();
        match guard.get(&state_key()) {
            Some(bytes) => Ok(Some(State::decode_exact(bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &State) -> Result<(), StoreError> {
        let height = state.last_block_height;
        let mut guard = self.inner.write();
        guard.insert(state_key(), state.encode_to_vec());
        // The snapshot fixes who validates the next two heights and under
        // which parameters; record them for height-indexed lookups.
        guard.insert(validators_key(height + 1), state.validators.encode_to_vec());
        guard.insert(
            validators_key(height + 2),
            state.next_validators.encode_to_vec(),
        );
        guard.insert(
            consensus_params_key(height + 1),
            state.consensus_params.encode_to_vec(),
        );
        Ok(())
    }

    fn save_abci_responses(
        &self,
        height: u64,
        responses: &AbciResponses,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .insert(abci_responses_key(height), responses.encode_to_vec());
        Ok(())
    }

    fn load_abci_responses(&self, height: u64) -> Result<Option<AbciResponses>, StoreError> {
        let guard = self.inner.read();
        match guard.get(&abci_responses_key(height)) {
            Some(bytes) => Ok(Some(AbciResponses::decode_exact(bytes)?)),
            None => Ok(None),
        }
    }

    fn load_validators(&self, height: u64) -> Result<Option<ValidatorSet>, StoreError> {
        let guard = self.inner.read();
        match guard.get(&validators_key(height)) {
            Some(bytes) => Ok(Some(ValidatorSet::decode_exact(bytes)?)),
            None => Ok(None),
        }
    }

    fn load_consensus_params(&self, height: u64) -> Result<Option<ConsensusParams>, StoreError> {
        let guard = self.inner.read();
        match guard.get(&consensus_params_key(height)) {
            Some(bytes) => Ok(Some(ConsensusParams::decode_exact(bytes)?)),
            None => Ok(None),
        }
    }
}
