//! Request/response messages of the application protocol, and the
//! [`Application`] trait.

use veris_consensus::{ConsensusParamsUpdate, ValidatorUpdate};
use veris_types::{Address, Hash32, Time};
use veris_wire::block::Header;
use veris_wire::io::{put_u32, put_var_bytes, WireDecode, WireEncode};
use veris_wire::WireError;

// ============================================================================
// Shared pieces
// ============================================================================

/// A validator as reported to the application: address and power only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbciValidator {
    pub address: Address,
    pub power: i64,
}

/// One entry of the last-commit report: a validator of the previous
/// height's set and whether its commit signature was for the block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteInfo {
    pub validator: AbciValidator,
    pub signed_last_block: bool,
}

/// The last-commit report delivered in BeginBlock. Entries follow the order
/// of the validator set that produced the commit, not the block's order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LastCommitInfo {
    pub round: u32,
    pub votes: Vec<VoteInfo>,
}

/// Kinds of misbehavior reported to the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbciEvidenceKind {
    DuplicateVote,
    LightClientAttack,
}

/// Misbehavior evidence in the application's representation, with the
/// offender's power at the offense height attached by the evidence pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbciEvidence {
    pub kind: AbciEvidenceKind,
    pub validator: AbciValidator,
    pub height: u64,
    pub time: Time,
    pub total_voting_power: i64,
}

/// A typed event emitted by the application, attached to block or
/// transaction results.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AbciEvent {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

// ============================================================================
// Requests and responses
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestBeginBlock {
    /// Hash of the block being executed.
    pub hash: Hash32,
    pub header: Header,
    pub last_commit_info: LastCommitInfo,
    pub byzantine_validators: Vec<AbciEvidence>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseBeginBlock {
    pub events: Vec<AbciEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDeliverTx {
    pub tx: Vec<u8>,
}

/// Result of executing one transaction. `code == 0` is success; any other
/// code is an app-defined failure that still consumes the transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseDeliverTx {
    pub code: u32,
    pub data: Vec<u8>,
    pub log: String,
    pub gas_wanted: i64,
    pub gas_used: i64,
    pub events: Vec<AbciEvent>,
}

impl ResponseDeliverTx {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestEndBlock {
    pub height: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseEndBlock {
    /// Validator diff to apply two heights ahead. Empty means no change.
    pub validator_updates: Vec<ValidatorUpdate>,
    /// Partial consensus-parameter update, effective next height.
    pub consensus_param_updates: Option<ConsensusParamsUpdate>,
    pub events: Vec<AbciEvent>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseCommit {
    /// The application state hash after this block.
    pub data: Vec<u8>,
    /// Lowest height the application still needs; earlier blocks may be
    /// pruned. Zero disables pruning.
    pub retain_height: u64,
}

/// Whether a CheckTx is a first-time admission or a recheck after a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckTxKind {
    New,
    Recheck,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestCheckTx {
    pub tx: Vec<u8>,
    pub kind: CheckTxKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseCheckTx {
    pub code: u32,
    pub log: String,
}

impl ResponseCheckTx {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

// ============================================================================
// Deterministic result encoding
// ============================================================================

// Only (code, data) feed the results hash: logs, gas numbers, and events are
// node-local and must not influence consensus.
impl WireEncode for ResponseDeliverTx {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.code);
        put_var_bytes(out, &self.data);
    }
}

impl WireDecode for ResponseDeliverTx {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let code = veris_wire::io::get_u32(input)?;
        let data = veris_wire::io::get_var_bytes(input, 1 << 20)?;
        Ok(ResponseDeliverTx {
            code,
            data,
            ..ResponseDeliverTx::default()
        })
    }
}

// ============================================================================
// Application trait
// ============================================================================

/// The replicated state machine.
///
/// Every method has a default no-op implementation so test applications
/// override only what they observe. Implementations must be deterministic:
/// identical request sequences must produce identical responses on every
/// node.
///
/// Commit must be idempotent at the same height: after a crash between the
/// application commit and the node's state save, the node re-runs the whole
/// block on startup and commits again.
pub trait Application: Send {
    fn begin_block(&mut self, _req: RequestBeginBlock) -> ResponseBeginBlock {
        ResponseBeginBlock::default()
    }

    fn deliver_tx(&mut self, _req: RequestDeliverTx) -> ResponseDeliverTx {
        ResponseDeliverTx::default()
    }

    fn end_block(&mut self, _req: RequestEndBlock) -> ResponseEndBlock {
        ResponseEndBlock::default()
    }

    fn commit(&mut self) -> ResponseCommit {
        ResponseCommit::default()
    }

    fn check_tx(&mut self, _req: RequestCheckTx) -> ResponseCheckTx {
        ResponseCheckTx::default()
    }
}
