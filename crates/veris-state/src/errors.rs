//! Error taxonomy of the block execution pipeline.

use veris_app::AppConnError;
use veris_consensus::{ParamsError, ValidatorSetError};

use crate::store::StoreError;
use crate::validation::{BlockValidationError, InvalidUpdateError};

/// Why an application response was rejected.
#[derive(Debug)]
pub enum AppResponseError {
    /// The validator diff failed policy checks (negative power, unlisted
    /// key type, duplicate address).
    InvalidUpdate(InvalidUpdateError),
    /// The diff passed policy but could not be applied to the set (removal
    /// of an unknown validator, empty resulting set, power overflow).
    ValidatorSet(ValidatorSetError),
    /// The merged consensus parameters failed range validation.
    Params(ParamsError),
}

impl std::fmt::Display for AppResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponseError::InvalidUpdate(err) => write!(f, "invalid validator update: {}", err),
            AppResponseError::ValidatorSet(err) => write!(f, "validator diff rejected: {}", err),
            AppResponseError::Params(err) => write!(f, "invalid consensus params: {}", err),
        }
    }
}

/// Errors out of `BlockExecutor::apply_block`.
///
/// None of these leave the state partially mutated: state is computed only
/// after every validation passes and becomes durable only when the save
/// succeeds.
#[derive(Debug)]
pub enum ExecutionError {
    /// Structural or chain-binding mismatch. The block is rejected; the
    /// state is unchanged and the driver decides how to proceed.
    InvalidBlock(BlockValidationError),
    /// Transport failure talking to the application. Fatal to the node.
    ProxyApp(AppConnError),
    /// The application returned a malformed diff or parameter update.
    /// Fatal: the application is broken.
    InvalidAppResponse(AppResponseError),
    /// Persisting the new state failed. Fatal; the node must not advance.
    StateSave(StoreError),
    /// Post-commit mempool reconciliation failed. The application has
    /// already committed; recovery is a restart, which replays the block.
    Mempool(crate::mempool::MempoolError),
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::InvalidBlock(err) => write!(f, "invalid block: {}", err),
            ExecutionError::ProxyApp(err) => write!(f, "application connection: {}", err),
            ExecutionError::InvalidAppResponse(err) => {
                write!(f, "invalid application response: {}", err)
            }
            ExecutionError::StateSave(err) => write!(f, "state save failed: {}", err),
            ExecutionError::Mempool(err) => write!(f, "mempool update failed: {}", err),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionError::InvalidBlock(err) => Some(err),
            ExecutionError::ProxyApp(err) => Some(err),
            ExecutionError::InvalidAppResponse(AppResponseError::InvalidUpdate(err)) => Some(err),
            ExecutionError::InvalidAppResponse(AppResponseError::ValidatorSet(err)) => Some(err),
            ExecutionError::InvalidAppResponse(AppResponseError::Params(err)) => Some(err),
            ExecutionError::StateSave(err) => Some(err),
            ExecutionError::Mempool(err) => Some(err),
        }
    }
}

impl From<BlockValidationError> for ExecutionError {
    fn from(err: BlockValidationError) -> Self {
        ExecutionError::InvalidBlock(err)
    }
}

impl From<AppConnError> for ExecutionError {
    fn from(err: AppConnError) -> Self {
        ExecutionError::ProxyApp(err)
    }
}
