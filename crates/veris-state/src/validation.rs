//! Structural block validation and validator-diff policy checks.

use veris_consensus::{ValidatorParams, ValidatorUpdate};
use veris_types::{to_hex, Address};
use veris_wire::block::Block;
use veris_wire::WireError;

use crate::state::State;

// ============================================================================
// Block validation (structural, against the current state)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockValidationError {
    Wire(WireError),
    WrongChainId { expected: String, got: String },
    WrongHeight { expected: u64, got: u64 },
    WrongLastBlockId,
    /// A header field does not match the value the state determines.
    HashMismatch(&'static str),
    WrongBlockVersion { expected: u64, got: u64 },
    WrongAppVersion { expected: u64, got: u64 },
    NonMonotonicTime,
    /// The first block must carry an empty last commit.
    UnexpectedLastCommit,
    WrongLastCommitSize { expected: usize, got: usize },
    WrongLastCommitHeight { expected: u64, got: u64 },
    /// A commit signature names an address outside the attributed set.
    UnknownCommitSigner(Address),
    UnknownProposer(Address),
    /// The evidence pool rejected the block's evidence.
    InvalidEvidence(String),
}

impl std::fmt::Display for BlockValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockValidationError::Wire(err) => write!(f, "malformed block: {}", err),
            BlockValidationError::WrongChainId { expected, got } => {
                write!(f, "wrong chain id: want {:?}, got {:?}", expected, got)
            }
            BlockValidationError::WrongHeight { expected, got } => {
                write!(f, "wrong height: want {}, got {}", expected, got)
            }
            BlockValidationError::WrongLastBlockId => write!(f, "last block id mismatch"),
            BlockValidationError::HashMismatch(field) => {
                write!(f, "header {} does not match state", field)
            }
            BlockValidationError::WrongBlockVersion { expected, got } => {
                write!(f, "wrong block version: want {}, got {}", expected, got)
            }
            BlockValidationError::WrongAppVersion { expected, got } => {
                write!(f, "wrong app version: want {}, got {}", expected, got)
            }
            BlockValidationError::NonMonotonicTime => {
                write!(f, "block time not after previous block time")
            }
            BlockValidationError::UnexpectedLastCommit => {
                write!(f, "initial block carries a last commit")
            }
            BlockValidationError::WrongLastCommitSize { expected, got } => {
                write!(f, "last commit has {} signatures, want {}", got, expected)
            }
            BlockValidationError::WrongLastCommitHeight { expected, got } => {
                write!(f, "last commit height {}, want {}", got, expected)
            }
            BlockValidationError::UnknownCommitSigner(addr) => {
                write!(f, "commit signer {} not in last validators", to_hex(addr))
            }
            BlockValidationError::UnknownProposer(addr) => {
                write!(f, "proposer {} not in validator set", to_hex(addr))
            }
            BlockValidationError::InvalidEvidence(msg) => {
                write!(f, "invalid evidence: {}", msg)
            }
        }
    }
}

impl std::error::Error for BlockValidationError {}

impl From<WireError> for BlockValidationError {
    fn from(err: WireError) -> Self {
        BlockValidationError::Wire(err)
    }
}

/// Validate a decided block structurally against the current state.
///
/// Covers internal consistency, chain binding, height sequencing, the
/// header's commitments to state-determined values, and attribution of the
/// last commit to `state.last_validators`. Cryptographic verification of
/// the commit signatures belongs to the consensus round protocol and is not
/// repeated here.
pub fn validate_block(state: &State, block: &Block) -> Result<(), BlockValidationError> {
    block.validate_basic()?;

    let header = &block.header;
    if header.version.block != state.version.consensus.block {
        return Err(BlockValidationError::WrongBlockVersion {
            expected: state.version.consensus.block,
            got: header.version.block,
        });
    }
    if header.version.app != state.version.consensus.app {
        return Err(BlockValidationError::WrongAppVersion {
            expected: state.version.consensus.app,
            got: header.version.app,
        });
    }
    if header.chain_id != state.chain_id {
        return Err(BlockValidationError::WrongChainId {
            expected: state.chain_id.clone(),
            got: header.chain_id.clone(),
        });
    }
    let expected_height = state.next_height();
    if header.height != expected_height {
        return Err(BlockValidationError::WrongHeight {
            expected: expected_height,
            got: header.height,
        });
    }
    if header.last_block_id != state.last_block_id {
        return Err(BlockValidationError::WrongLastBlockId);
    }
    if header.validators_hash != state.validators.hash() {
        return Err(BlockValidationError::HashMismatch("validators_hash"));
    }
    if header.next_validators_hash != state.next_validators.hash() {
        return Err(BlockValidationError::HashMismatch("next_validators_hash"));
    }
    if header.consensus_hash != state.consensus_params.hash() {
        return Err(BlockValidationError::HashMismatch("consensus_hash"));
    }
    if header.app_hash != state.app_hash {
        return Err(BlockValidationError::HashMismatch("app_hash"));
    }
    if header.last_results_hash != state.last_results_hash {
        return Err(BlockValidationError::HashMismatch("last_results_hash"));
    }
    if header.height > state.initial_height && header.time <= state.last_block_time {
        return Err(BlockValidationError::NonMonotonicTime);
    }

    if header.height == state.initial_height {
        if !block.last_commit.signatures.is_empty() {
            return Err(BlockValidationError::UnexpectedLastCommit);
        }
    } else {
        let expected = state.last_validators.len();
        let got = block.last_commit.signatures.len();
        if got != expected {
            return Err(BlockValidationError::WrongLastCommitSize { expected, got });
        }
        if block.last_commit.height != header.height - 1 {
            return Err(BlockValidationError::WrongLastCommitHeight {
                expected: header.height - 1,
                got: block.last_commit.height,
            });
        }
        for sig in &block.last_commit.signatures {
            if let Some(addr) = sig.validator_address() {
                if !state.last_validators.has_address(addr) {
                    return Err(BlockValidationError::UnknownCommitSigner(*addr));
                }
            }
        }
    }

    if !state.validators.has_address(&header.proposer_address) {
        return Err(BlockValidationError::UnknownProposer(
            header.proposer_address,
        ));
    }

    Ok(())
}

// ============================================================================
// Validator-updates validation (policy on the application's diff)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidUpdateError {
    NegativePower { power: i64 },
    UnsupportedKeyType { key_type: String },
    DuplicateValidator(Address),
}

impl std::fmt::Display for InvalidUpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidUpdateError::NegativePower { power } => {
                write!(f, "validator update with negative power {}", power)
            }
            InvalidUpdateError::UnsupportedKeyType { key_type } => {
                write!(f, "validator key type {:?} not in whitelist", key_type)
            }
            InvalidUpdateError::DuplicateValidator(addr) => {
                write!(f, "duplicate validator {} in update batch", to_hex(addr))
            }
        }
    }
}

impl std::error::Error for InvalidUpdateError {}

/// Check an application-supplied validator diff against policy: powers must
/// be non-negative, key types must be whitelisted, and no address may
/// appear twice. The entries are already in the consensus layer's diff
/// representation, so no conversion follows a successful check.
pub fn validate_validator_updates(
    updates: &[ValidatorUpdate],
    params: &ValidatorParams,
) -> Result<(), InvalidUpdateError> {
    let mut seen: std::collections::HashSet<Address> =
        std::collections::HashSet::with_capacity(updates.len());
    for update in updates {
        if update.power < 0 {
            return Err(InvalidUpdateError::NegativePower {
                power: update.power,
            });
        }
        let key_type = update.pub_key.type_name();
        if !params.pub_key_types.iter().any(|t| t == key_type) {
            return Err(InvalidUpdateError::UnsupportedKeyType {
                key_type: key_type.to_string(),
            });
        }
        if !seen.insert(update.address()) {
            return Err(InvalidUpdateError::DuplicateValidator(update.address()));
        }
    }
    Ok(())
}
