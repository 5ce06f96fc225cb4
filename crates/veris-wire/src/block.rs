//! Block structures: header, commit, evidence, and their content hashes.
//!
//! Every structure carries a documented little-endian wire layout via
//! `WireEncode`/`WireDecode`; content hashes are SHA3-256 over the wire
//! encoding. These encodings double as the persistence format for the state
//! store.

use veris_crypto::hash_bytes;
use veris_types::{to_hex, Address, ConsensusVersion, Hash32, Time, MAX_CHAIN_ID_LEN};

use crate::error::WireError;
use crate::io::{
    get_address, get_hash32, get_i64, get_string, get_u32, get_u64, get_u8, get_var_bytes,
    put_bytes, put_i64, put_string, put_u32, put_u64, put_u8, put_var_bytes, WireDecode,
    WireEncode,
};

/// Upper bound on a single signature blob accepted off the wire.
pub const MAX_SIGNATURE_LEN: usize = 128;

/// Upper bound on a single transaction accepted off the wire.
pub const MAX_TX_LEN: usize = 1 << 22;

/// A raw transaction blob. Opaque to consensus; interpreted by the app.
pub type Tx = Vec<u8>;

// ============================================================================
// BlockId
// ============================================================================

/// Header of the part set a block was split into for gossip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartSetHeader {
    pub total: u32,
    pub hash: Hash32,
}

impl PartSetHeader {
    pub fn is_zero(&self) -> bool {
        self.total == 0 && self.hash == [0u8; 32]
    }
}

impl WireEncode for PartSetHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.total);
        put_bytes(out, &self.hash);
    }
}

impl WireDecode for PartSetHeader {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let total = get_u32(input)?;
        let hash = get_hash32(input)?;
        Ok(PartSetHeader { total, hash })
    }
}

/// Full identifier of a block: its hash plus the part-set header.
///
/// The all-zero value identifies "no block" (nil votes, genesis
/// predecessor).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockId {
    pub hash: Hash32,
    pub part_set_header: PartSetHeader,
}

impl BlockId {
    pub fn is_zero(&self) -> bool {
        self.hash == [0u8; 32] && self.part_set_header.is_zero()
    }
}

impl WireEncode for BlockId {
    fn encode(&self, out: &mut Vec<u8>) {
        put_bytes(out, &self.hash);
        self.part_set_header.encode(out);
    }
}

impl WireDecode for BlockId {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let hash = get_hash32(input)?;
        let part_set_header = PartSetHeader::decode(input)?;
        Ok(BlockId {
            hash,
            part_set_header,
        })
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", to_hex(&self.hash))
    }
}

// ============================================================================
// CommitSig
// ============================================================================

/// One validator's contribution to a block's commit.
///
/// Only `ForBlock` counts as "signed the last block" when commit info is
/// reported to the application.
///
/// Wire layout: flag byte (0 absent, 1 for-block, 2 nil), then for the
/// non-absent variants: validator address (20), timestamp (i64 ns),
/// signature (u32 len + bytes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitSig {
    /// The validator's vote never arrived.
    Absent,
    /// The validator signed the committed block.
    ForBlock {
        validator_address: Address,
        timestamp: Time,
        signature: Vec<u8>,
    },
    /// The validator voted nil.
    Nil {
        validator_address: Address,
        timestamp: Time,
        signature: Vec<u8>,
    },
}

const COMMIT_SIG_ABSENT: u8 = 0;
const COMMIT_SIG_FOR_BLOCK: u8 = 1;
const COMMIT_SIG_NIL: u8 = 2;

impl CommitSig {
    pub fn is_for_block(&self) -> bool {
        matches!(self, CommitSig::ForBlock { .. })
    }

    /// Address of the signer, if the vote arrived at all.
    pub fn validator_address(&self) -> Option<&Address> {
        match self {
            CommitSig::Absent => None,
            CommitSig::ForBlock {
                validator_address, ..
            }
            | CommitSig::Nil {
                validator_address, ..
            } => Some(validator_address),
        }
    }

    pub fn validate_basic(&self) -> Result<(), WireError> {
        match self {
            CommitSig::Absent => Ok(()),
            CommitSig::ForBlock { signature, .. } | CommitSig::Nil { signature, .. } => {
                if signature.is_empty() {
                    return Err(WireError::InvalidValue("commit sig without signature"));
                }
                if signature.len() > MAX_SIGNATURE_LEN {
                    return Err(WireError::TooLarge {
                        actual: signature.len(),
                        max: MAX_SIGNATURE_LEN,
                    });
                }
                Ok(())
            }
        }
    }
}

impl WireEncode for CommitSig {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            CommitSig::Absent => put_u8(out, COMMIT_SIG_ABSENT),
            CommitSig::ForBlock {
                validator_address,
                timestamp,
                signature,
            } => {
                put_u8(out, COMMIT_SIG_FOR_BLOCK);
                put_bytes(out, validator_address);
                put_i64(out, timestamp.as_unix_nanos());
                put_var_bytes(out, signature);
            }
            CommitSig::Nil {
                validator_address,
                timestamp,
                signature,
            } => {
                put_u8(out, COMMIT_SIG_NIL);
                put_bytes(out, validator_address);
                put_i64(out, timestamp.as_unix_nanos());
                put_var_bytes(out, signature);
            }
        }
    }
}

impl WireDecode for CommitSig {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let flag = get_u8(input)?;
        if flag == COMMIT_SIG_ABSENT {
            return Ok(CommitSig::Absent);
        }
        let validator_address = get_address(input)?;
        let timestamp = Time::from_unix_nanos(get_i64(input)?);
        let signature = get_var_bytes(input, MAX_SIGNATURE_LEN)?;
        match flag {
            COMMIT_SIG_FOR_BLOCK => Ok(CommitSig::ForBlock {
                validator_address,
                timestamp,
                signature,
            }),
            COMMIT_SIG_NIL => Ok(CommitSig::Nil {
                validator_address,
                timestamp,
                signature,
            }),
            _ => Err(WireError::InvalidValue("unknown commit sig flag")),
        }
    }
}

// ============================================================================
// Commit
// ============================================================================

/// The +2/3 commit for a block: one `CommitSig` per validator of the set
/// that was active at the committed height, in that set's order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Commit {
    pub height: u64,
    pub round: u32,
    pub block_id: BlockId,
    pub signatures: Vec<CommitSig>,
}

impl Commit {
    /// Content hash over the wire encoding.
    pub fn hash(&self) -> Hash32 {
        hash_bytes(&self.encode_to_vec())
    }

    pub fn validate_basic(&self) -> Result<(), WireError> {
        if self.height > 0 {
            if self.block_id.is_zero() {
                return Err(WireError::InvalidValue("commit for zero block id"));
            }
            if self.signatures.is_empty() {
                return Err(WireError::InvalidValue("commit without signatures"));
            }
        }
        for sig in &self.signatures {
            sig.validate_basic()?;
        }
        Ok(())
    }
}

impl WireEncode for Commit {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u64(out, self.height);
        put_u32(out, self.round);
        self.block_id.encode(out);
        put_u32(out, self.signatures.len() as u32);
        for sig in &self.signatures {
            sig.encode(out);
        }
    }
}

impl WireDecode for Commit {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let height = get_u64(input)?;
        let round = get_u32(input)?;
        let block_id = BlockId::decode(input)?;
        let count = get_u32(input)? as usize;
        let mut signatures = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            signatures.push(CommitSig::decode(input)?);
        }
        Ok(Commit {
            height,
            round,
            block_id,
            signatures,
        })
    }
}

// ============================================================================
// Evidence
// ============================================================================

/// Misbehavior evidence carried in a block.
///
/// The executor treats evidence as opaque: it hands the list to the evidence
/// pool adapter, which attaches voting powers and converts to the
/// application's representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Evidence {
    /// Two conflicting votes at the same height/round.
    DuplicateVote {
        validator_address: Address,
        height: u64,
        time: Time,
    },
    /// A conflicting light-client header.
    LightClientAttack {
        validator_address: Address,
        height: u64,
        time: Time,
    },
}

const EVIDENCE_DUPLICATE_VOTE: u8 = 1;
const EVIDENCE_LIGHT_CLIENT_ATTACK: u8 = 2;

impl Evidence {
    pub fn height(&self) -> u64 {
        match self {
            Evidence::DuplicateVote { height, .. }
            | Evidence::LightClientAttack { height, .. } => *height,
        }
    }

    pub fn validator_address(&self) -> &Address {
        match self {
            Evidence::DuplicateVote {
                validator_address, ..
            }
            | Evidence::LightClientAttack {
                validator_address, ..
            } => validator_address,
        }
    }
}

impl WireEncode for Evidence {
    fn encode(&self, out: &mut Vec<u8>) {
        let (flag, validator_address, height, time) = match self {
            Evidence::DuplicateVote {
                validator_address,
                height,
                time,
            } => (EVIDENCE_DUPLICATE_VOTE, validator_address, height, time),
            Evidence::LightClientAttack {
                validator_address,
                height,
                time,
            } => (
                EVIDENCE_LIGHT_CLIENT_ATTACK,
                validator_address,
                height,
                time,
            ),
        };
        put_u8(out, flag);
        put_bytes(out, validator_address);
        put_u64(out, *height);
        put_i64(out, time.as_unix_nanos());
    }
}

impl WireDecode for Evidence {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let flag = get_u8(input)?;
        let validator_address = get_address(input)?;
        let height = get_u64(input)?;
        let time = Time::from_unix_nanos(get_i64(input)?);
        match flag {
            EVIDENCE_DUPLICATE_VOTE => Ok(Evidence::DuplicateVote {
                validator_address,
                height,
                time,
            }),
            EVIDENCE_LIGHT_CLIENT_ATTACK => Ok(Evidence::LightClientAttack {
                validator_address,
                height,
                time,
            }),
            _ => Err(WireError::InvalidValue("unknown evidence kind")),
        }
    }
}

// ============================================================================
// Header
// ============================================================================

/// Block header.
///
/// The header commits to everything a light verifier needs: the previous
/// block, the transaction data, both validator sets, the consensus
/// parameters, and the application state as of the previous block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub version: ConsensusVersion,
    pub chain_id: String,
    pub height: u64,
    pub time: Time,
    pub last_block_id: BlockId,
    /// Hash of the previous block's commit.
    pub last_commit_hash: Hash32,
    /// Hash of the transactions in this block.
    pub data_hash: Hash32,
    /// Hash of the validator set active at this height.
    pub validators_hash: Hash32,
    /// Hash of the validator set active at the next height.
    pub next_validators_hash: Hash32,
    /// Hash of the consensus parameters active at this height.
    pub consensus_hash: Hash32,
    /// Application state hash after the previous block.
    pub app_hash: Vec<u8>,
    /// Hash of the DeliverTx results of the previous block.
    pub last_results_hash: Hash32,
    /// Hash of the evidence included in this block.
    pub evidence_hash: Hash32,
    pub proposer_address: Address,
}

impl Header {
    /// Content hash of the header; this is the block's identity.
    pub fn hash(&self) -> Hash32 {
        hash_bytes(&self.encode_to_vec())
    }

    pub fn validate_basic(&self) -> Result<(), WireError> {
        if self.chain_id.is_empty() || self.chain_id.len() > MAX_CHAIN_ID_LEN {
            return Err(WireError::InvalidValue("bad chain id length"));
        }
        if self.height == 0 {
            return Err(WireError::InvalidValue("zero block height"));
        }
        Ok(())
    }
}

impl WireEncode for Header {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u64(out, self.version.block);
        put_u64(out, self.version.app);
        put_string(out, &self.chain_id);
        put_u64(out, self.height);
        put_i64(out, self.time.as_unix_nanos());
        self.last_block_id.encode(out);
        put_bytes(out, &self.last_commit_hash);
        put_bytes(out, &self.data_hash);
        put_bytes(out, &self.validators_hash);
        put_bytes(out, &self.next_validators_hash);
        put_bytes(out, &self.consensus_hash);
        put_var_bytes(out, &self.app_hash);
        put_bytes(out, &self.last_results_hash);
        put_bytes(out, &self.evidence_hash);
        put_bytes(out, &self.proposer_address);
    }
}

impl WireDecode for Header {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let version = ConsensusVersion {
            block: get_u64(input)?,
            app: get_u64(input)?,
        };
        let chain_id = get_string(input, MAX_CHAIN_ID_LEN)?;
        let height = get_u64(input)?;
        let time = Time::from_unix_nanos(get_i64(input)?);
        let last_block_id = BlockId::decode(input)?;
        let last_commit_hash = get_hash32(input)?;
        let data_hash = get_hash32(input)?;
        let validators_hash = get_hash32(input)?;
        let next_validators_hash = get_hash32(input)?;
        let consensus_hash = get_hash32(input)?;
        let app_hash = get_var_bytes(input, 256)?;
        let last_results_hash = get_hash32(input)?;
        let evidence_hash = get_hash32(input)?;
        let proposer_address = get_address(input)?;
        Ok(Header {
            version,
            chain_id,
            height,
            time,
            last_block_id,
            last_commit_hash,
            data_hash,
            validators_hash,
            next_validators_hash,
            consensus_hash,
            app_hash,
            last_results_hash,
            evidence_hash,
            proposer_address,
        })
    }
}

// ============================================================================
// Block
// ============================================================================

/// An ordered, authenticated collection of transactions plus the commit for
/// the previous block and any evidence of misbehavior.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub data: Vec<Tx>,
    pub evidence: Vec<Evidence>,
    pub last_commit: Commit,
}

impl Block {
    /// The block's identity: the hash of its header.
    pub fn hash(&self) -> Hash32 {
        self.header.hash()
    }

    /// Internal-consistency checks: the header must commit to the block's
    /// own contents.
    pub fn validate_basic(&self) -> Result<(), WireError> {
        self.header.validate_basic()?;
        self.last_commit.validate_basic()?;
        if self.header.data_hash != hash_txs(&self.data) {
            return Err(WireError::InvalidValue("data hash mismatch"));
        }
        if self.header.evidence_hash != hash_evidence(&self.evidence) {
            return Err(WireError::InvalidValue("evidence hash mismatch"));
        }
        if self.header.last_commit_hash != self.last_commit.hash() {
            return Err(WireError::InvalidValue("last commit hash mismatch"));
        }
        Ok(())
    }
}

impl WireEncode for Block {
    fn encode(&self, out: &mut Vec<u8>) {
        self.header.encode(out);
        put_u32(out, self.data.len() as u32);
        for tx in &self.data {
            put_var_bytes(out, tx);
        }
        put_u32(out, self.evidence.len() as u32);
        for ev in &self.evidence {
            ev.encode(out);
        }
        self.last_commit.encode(out);
    }
}

impl WireDecode for Block {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let header = Header::decode(input)?;
        let tx_count = get_u32(input)? as usize;
        let mut data = Vec::with_capacity(tx_count.min(1024));
        for _ in 0..tx_count {
            data.push(get_var_bytes(input, MAX_TX_LEN)?);
        }
        let ev_count = get_u32(input)? as usize;
        let mut evidence = Vec::with_capacity(ev_count.min(1024));
        for _ in 0..ev_count {
            evidence.push(Evidence::decode(input)?);
        }
        let last_commit = Commit::decode(input)?;
        Ok(Block {
            header,
            data,
            evidence,
            last_commit,
        })
    }
}

// ============================================================================
// Content hashes
// ============================================================================

/// Hash of a transaction list: SHA3 over length-prefixed blobs.
pub fn hash_txs(txs: &[Tx]) -> Hash32 {
    let mut buf = Vec::new();
    put_u32(&mut buf, txs.len() as u32);
    for tx in txs {
        put_var_bytes(&mut buf, tx);
    }
    hash_bytes(&buf)
}

/// Hash of an evidence list.
pub fn hash_evidence(evidence: &[Evidence]) -> Hash32 {
    let mut buf = Vec::new();
    put_u32(&mut buf, evidence.len() as u32);
    for ev in evidence {
        ev.encode(&mut buf);
    }
    hash_bytes(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        [b; 20]
    }

    #[test]
    fn commit_sig_roundtrip() {
        let sigs = vec![
            CommitSig::Absent,
            CommitSig::ForBlock {
                validator_address: addr(1),
                timestamp: Time::from_unix_secs(10),
                signature: vec![9; 64],
            },
            CommitSig::Nil {
                validator_address: addr(2),
                timestamp: Time::from_unix_secs(11),
                signature: vec![8; 64],
            },
        ];
        for sig in sigs {
            let decoded = CommitSig::decode_exact(&sig.encode_to_vec()).expect("roundtrip");
            assert_eq!(decoded, sig);
        }
    }

    #[test]
    fn only_for_block_counts_as_signed() {
        let fb = CommitSig::ForBlock {
            validator_address: addr(1),
            timestamp: Time::default(),
            signature: vec![1; 64],
        };
        let nil = CommitSig::Nil {
            validator_address: addr(1),
            timestamp: Time::default(),
            signature: vec![1; 64],
        };
        assert!(fb.is_for_block());
        assert!(!nil.is_for_block());
        assert!(!CommitSig::Absent.is_for_block());
    }

    #[test]
    fn header_hash_changes_with_contents() {
        let mut header = Header {
            chain_id: "test-chain".to_string(),
            height: 5,
            ..Header::default()
        };
        let h1 = header.hash();
        header.height = 6;
        assert_ne!(h1, header.hash());
    }

    #[test]
    fn block_validate_basic_checks_data_hash() {
        let data = vec![b"tx1".to_vec()];
        let mut block = Block {
            header: Header {
                chain_id: "test-chain".to_string(),
                height: 1,
                data_hash: hash_txs(&data),
                evidence_hash: hash_evidence(&[]),
                ..Header::default()
            },
            data,
            evidence: Vec::new(),
            last_commit: Commit::default(),
        };
        block.header.last_commit_hash = block.last_commit.hash();
        block.validate_basic().expect("consistent block");

        block.data.push(b"tx2".to_vec());
        assert!(block.validate_basic().is_err());
    }
}
