//! Protocol and software version records carried by the consensus state.

/// Consensus protocol versions: the block structure version and the
/// application's own state-machine version.
///
/// The app version changes when the application signals a new version through
/// an EndBlock consensus-parameter update; the block version only changes
/// with a coordinated upgrade of the node software itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsensusVersion {
    pub block: u64,
    pub app: u64,
}

/// The nested version record persisted inside the consensus state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateVersion {
    pub consensus: ConsensusVersion,
    pub software: String,
}

impl StateVersion {
    /// Version record for a fresh chain running this software.
    pub fn current() -> Self {
        StateVersion {
            consensus: ConsensusVersion {
                block: BLOCK_PROTOCOL_VERSION,
                app: 0,
            },
            software: SOFTWARE_VERSION.to_string(),
        }
    }
}

/// Version of the block wire structure produced by this software.
pub const BLOCK_PROTOCOL_VERSION: u64 = 1;

/// Software version string stamped into new states.
pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
