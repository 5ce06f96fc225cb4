//! Evidence pool adapter: the executor's window onto misbehavior handling.
//!
//! The pool owns evidence policy (age limits, de-duplication, gossip); the
//! executor only asks it to render block evidence into the application's
//! representation, to sanity-check submitted evidence, and tells it when a
//! block commits so it can expire what is now stale.

use veris_app::AbciEvidence;
use veris_wire::block::Evidence;

use crate::state::State;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidencePoolError {
    /// Evidence is older than the configured age bounds.
    Expired { height: u64, max_age_num_blocks: i64 },
    /// Evidence names a validator outside the set at its height.
    UnknownValidator,
    Other(String),
}

impl std::fmt::Display for EvidencePoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvidencePoolError::Expired {
                height,
                max_age_num_blocks,
            } => write!(
                f,
                "evidence from height {} is beyond the {}-block age bound",
                height, max_age_num_blocks
            ),
            EvidencePoolError::UnknownValidator => {
                write!(f, "evidence names an unknown validator")
            }
            EvidencePoolError::Other(msg) => write!(f, "evidence pool: {}", msg),
        }
    }
}

impl std::error::Error for EvidencePoolError {}

/// The pool contract the executor consumes.
pub trait EvidencePool: Send + Sync {
    /// Render the evidence to include for a block at `height` into the
    /// application's representation, powers attached.
    fn abci_evidence(&self, height: u64, evidence: &[Evidence]) -> Vec<AbciEvidence>;

    /// Sanity-check evidence submitted in a block.
    fn check_evidence(&self, evidence: &[Evidence]) -> Result<(), EvidencePoolError>;

    /// A block committed; expire evidence the new state makes stale.
    fn update(&self, state: &State);
}

/// A pool with no evidence and no objections. The executor's default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvidencePool;

impl EvidencePool for NoopEvidencePool {
    fn abci_evidence(&self, _height: u64, _evidence: &[Evidence]) -> Vec<AbciEvidence> {
        Vec::new()
    }

    fn check_evidence(&self, _evidence: &[Evidence]) -> Result<(), EvidencePoolError> {
        Ok(())
    }

    fn update(&self, _state: &State) {}
}
