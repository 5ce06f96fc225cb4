//! Consensus parameters: negotiated limits persisted per height.
//!
//! The application may adjust parameters through its EndBlock response; the
//! executor validates the merged result before adopting it, so a broken
//! application cannot push the chain into an unusable configuration.

use veris_crypto::hash_bytes;
use veris_types::Hash32;

use veris_wire::error::WireError;
use veris_wire::io::{
    get_i64, get_string, get_u16, get_u64, get_u8, put_i64, put_string, put_u16, put_u64, put_u8,
    WireDecode, WireEncode,
};

/// Hard ceiling on a block's byte size.
pub const MAX_BLOCK_SIZE_BYTES: i64 = 100 * 1024 * 1024;

// ============================================================================
// Parameter groups
// ============================================================================

/// Limits on block size and gas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockParams {
    /// Maximum block size in bytes.
    pub max_bytes: i64,
    /// Maximum gas per block; -1 means unlimited.
    pub max_gas: i64,
}

impl Default for BlockParams {
    fn default() -> Self {
        BlockParams {
            max_bytes: 22_020_096,
            max_gas: -1,
        }
    }
}

/// Limits on how old submitted evidence may be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvidenceParams {
    /// Maximum age of evidence in blocks.
    pub max_age_num_blocks: i64,
    /// Maximum age of evidence in nanoseconds.
    pub max_age_duration: i64,
    /// Maximum total evidence size per block, in bytes.
    pub max_bytes: i64,
}

impl Default for EvidenceParams {
    fn default() -> Self {
        EvidenceParams {
            max_age_num_blocks: 100_000,
            max_age_duration: 48 * 60 * 60 * 1_000_000_000,
            max_bytes: 1_048_576,
        }
    }
}

/// The whitelist of validator public key types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorParams {
    pub pub_key_types: Vec<String>,
}

impl Default for ValidatorParams {
    fn default() -> Self {
        ValidatorParams {
            pub_key_types: vec![veris_crypto::ED25519_KEY_TYPE.to_string()],
        }
    }
}

/// The application protocol version, advanced by the application itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VersionParams {
    pub app_version: u64,
}

/// The full negotiated parameter record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsensusParams {
    pub block: BlockParams,
    pub evidence: EvidenceParams,
    pub validator: ValidatorParams,
    pub version: VersionParams,
}

// ============================================================================
// Updates and validation
// ============================================================================

/// A partial parameter update from the application's EndBlock response.
/// `None` groups are left unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConsensusParamsUpdate {
    pub block: Option<BlockParams>,
    pub evidence: Option<EvidenceParams>,
    pub validator: Option<ValidatorParams>,
    pub version: Option<VersionParams>,
}

impl ConsensusParamsUpdate {
    pub fn is_empty(&self) -> bool {
        self.block.is_none()
            && self.evidence.is_none()
            && self.validator.is_none()
            && self.version.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    /// `block.max_bytes` outside (0, MAX_BLOCK_SIZE_BYTES].
    InvalidBlockMaxBytes(i64),
    /// `block.max_gas` below -1.
    InvalidBlockMaxGas(i64),
    /// An evidence age bound is non-positive.
    InvalidEvidenceAge { num_blocks: i64, duration: i64 },
    /// Evidence bytes limit is negative or exceeds the block limit.
    InvalidEvidenceMaxBytes { evidence: i64, block: i64 },
    /// The key-type whitelist is empty.
    EmptyPubKeyTypes,
    /// The whitelist names a key type this software cannot verify.
    UnknownPubKeyType(String),
}

impl std::fmt::Display for ParamsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamsError::InvalidBlockMaxBytes(v) => {
                write!(f, "block.max_bytes must be in 1..={}, got {}", MAX_BLOCK_SIZE_BYTES, v)
            }
            ParamsError::InvalidBlockMaxGas(v) => {
                write!(f, "block.max_gas must be >= -1, got {}", v)
            }
            ParamsError::InvalidEvidenceAge {
                num_blocks,
                duration,
            } => write!(
                f,
                "evidence age bounds must be positive, got {} blocks / {} ns",
                num_blocks, duration
            ),
            ParamsError::InvalidEvidenceMaxBytes { evidence, block } => write!(
                f,
                "evidence.max_bytes {} must be in 0..=block.max_bytes {}",
                evidence, block
            ),
            ParamsError::EmptyPubKeyTypes => write!(f, "validator.pub_key_types is empty"),
            ParamsError::UnknownPubKeyType(t) => write!(f, "unknown pub key type {:?}", t),
        }
    }
}

impl std::error::Error for ParamsError {}

impl ConsensusParams {
    /// Check every field range. Run on genesis parameters and on every
    /// merged update before it is adopted.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.block.max_bytes <= 0 || self.block.max_bytes > MAX_BLOCK_SIZE_BYTES {
            return Err(ParamsError::InvalidBlockMaxBytes(self.block.max_bytes));
        }
        if self.block.max_gas < -1 {
            return Err(ParamsError::InvalidBlockMaxGas(self.block.max_gas));
        }
        if self.evidence.max_age_num_blocks <= 0 || self.evidence.max_age_duration <= 0 {
            return Err(ParamsError::InvalidEvidenceAge {
                num_blocks: self.evidence.max_age_num_blocks,
                duration: self.evidence.max_age_duration,
            });
        }
        if self.evidence.max_bytes < 0 || self.evidence.max_bytes > self.block.max_bytes {
            return Err(ParamsError::InvalidEvidenceMaxBytes {
                evidence: self.evidence.max_bytes,
                block: self.block.max_bytes,
            });
        }
        if self.validator.pub_key_types.is_empty() {
            return Err(ParamsError::EmptyPubKeyTypes);
        }
        for key_type in &self.validator.pub_key_types {
            if key_type != veris_crypto::ED25519_KEY_TYPE {
                return Err(ParamsError::UnknownPubKeyType(key_type.clone()));
            }
        }
        Ok(())
    }

    /// Merge a partial update, returning the resulting parameters.
    pub fn update(&self, update: &ConsensusParamsUpdate) -> ConsensusParams {
        ConsensusParams {
            block: update.block.unwrap_or(self.block),
            evidence: update.evidence.unwrap_or(self.evidence),
            validator: update
                .validator
                .clone()
                .unwrap_or_else(|| self.validator.clone()),
            version: update.version.unwrap_or(self.version),
        }
    }

    /// Content hash over the wire encoding, committed into block headers.
    pub fn hash(&self) -> Hash32 {
        hash_bytes(&self.encode_to_vec())
    }
}

// ============================================================================
// Wire encoding (persistence + header hash)
// ============================================================================

impl WireEncode for ConsensusParams {
    fn encode(&self, out: &mut Vec<u8>) {
        put_i64(out, self.block.max_bytes);
        put_i64(out, self.block.max_gas);
        put_i64(out, self.evidence.max_age_num_blocks);
        put_i64(out, self.evidence.max_age_duration);
        put_i64(out, self.evidence.max_bytes);
        put_u16(out, self.validator.pub_key_types.len() as u16);
        for key_type in &self.validator.pub_key_types {
            put_string(out, key_type);
        }
        put_u64(out, self.version.app_version);
    }
}

impl WireDecode for ConsensusParams {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let block = BlockParams {
            max_bytes: get_i64(input)?,
            max_gas: get_i64(input)?,
        };
        let evidence = EvidenceParams {
            max_age_num_blocks: get_i64(input)?,
            max_age_duration: get_i64(input)?,
            max_bytes: get_i64(input)?,
        };
        let count = get_u16(input)? as usize;
        let mut pub_key_types = Vec::with_capacity(count.min(16));
        for _ in 0..count {
            pub_key_types.push(get_string(input, 32)?);
        }
        let version = VersionParams {
            app_version: get_u64(input)?,
        };
        Ok(ConsensusParams {
            block,
            evidence,
            validator: ValidatorParams { pub_key_types },
            version,
        })
    }
}

impl WireEncode for ConsensusParamsUpdate {
    fn encode(&self, out: &mut Vec<u8>) {
        match &self.block {
            Some(b) => {
                put_u8(out, 1);
                put_i64(out, b.max_bytes);
                put_i64(out, b.max_gas);
            }
            None => put_u8(out, 0),
        }
        match &self.evidence {
            Some(e) => {
                put_u8(out, 1);
                put_i64(out, e.max_age_num_blocks);
                put_i64(out, e.max_age_duration);
                put_i64(out, e.max_bytes);
            }
            None => put_u8(out, 0),
        }
        match &self.validator {
            Some(v) => {
                put_u8(out, 1);
                put_u16(out, v.pub_key_types.len() as u16);
                for key_type in &v.pub_key_types {
                    put_string(out, key_type);
                }
            }
            None => put_u8(out, 0),
        }
        match &self.version {
            Some(v) => {
                put_u8(out, 1);
                put_u64(out, v.app_version);
            }
            None => put_u8(out, 0),
        }
    }
}

impl WireDecode for ConsensusParamsUpdate {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let block = match get_u8(input)? {
            0 => None,
            1 => Some(BlockParams {
                max_bytes: get_i64(input)?,
                max_gas: get_i64(input)?,
            }),
            _ => return Err(WireError::InvalidValue("bad block params flag")),
        };
        let evidence = match get_u8(input)? {
            0 => None,
            1 => Some(EvidenceParams {
                max_age_num_blocks: get_i64(input)?,
                max_age_duration: get_i64(input)?,
                max_bytes: get_i64(input)?,
            }),
            _ => return Err(WireError::InvalidValue("bad evidence params flag")),
        };
        let validator = match get_u8(input)? {
            0 => None,
            1 => {
                let count = get_u16(input)? as usize;
                let mut pub_key_types = Vec::with_capacity(count.min(16));
                for _ in 0..count {
                    pub_key_types.push(get_string(input, 32)?);
                }
                Some(ValidatorParams { pub_key_types })
            }
            _ => return Err(WireError::InvalidValue("bad validator params flag")),
        };
        let version = match get_u8(input)? {
            0 => None,
            1 => Some(VersionParams {
                app_version: get_u64(input)?,
            }),
            _ => return Err(WireError::InvalidValue("bad version params flag")),
        };
        Ok(ConsensusParamsUpdate {
            block,
            evidence,
            validator,
            version,
        })
    }
}
