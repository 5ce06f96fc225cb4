//! Votes and proposals, with their chain-bound signing preimages.
//!
//! Signing preimages prefix a versioned domain tag and the chain id, so a
//! signature produced for one chain can never validate on another. Changing
//! a preimage layout is a consensus-breaking change and must bump the tag
//! version.

use veris_types::{to_hex, Address, Time, MAX_CHAIN_ID_LEN};

use crate::block::{BlockId, MAX_SIGNATURE_LEN};
use crate::error::WireError;
use crate::io::{
    get_address, get_i64, get_u32, get_u64, get_u8, get_var_bytes, put_bytes, put_i64, put_string,
    put_u32, put_u64, put_u8, put_var_bytes, WireDecode, WireEncode,
};

/// Domain tag for vote signing preimages.
pub const VOTE_DOMAIN_TAG: &[u8] = b"VERIS:VOTE:v1";

/// Domain tag for proposal signing preimages.
pub const PROPOSAL_DOMAIN_TAG: &[u8] = b"VERIS:PROPOSAL:v1";

// ============================================================================
// Signed message types
// ============================================================================

/// Discriminator for the kinds of consensus messages a validator signs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedMsgType {
    Prevote,
    Precommit,
    Proposal,
}

impl SignedMsgType {
    pub fn as_u8(self) -> u8 {
        match self {
            SignedMsgType::Prevote => 0x01,
            SignedMsgType::Precommit => 0x02,
            SignedMsgType::Proposal => 0x20,
        }
    }

    pub fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            0x01 => Ok(SignedMsgType::Prevote),
            0x02 => Ok(SignedMsgType::Precommit),
            0x20 => Ok(SignedMsgType::Proposal),
            _ => Err(WireError::InvalidValue("unknown signed message type")),
        }
    }
}

// ============================================================================
// Vote
// ============================================================================

/// A single validator's vote.
///
/// A zero `block_id` is a nil vote.
///
/// Wire layout:
/// ```text
/// vote_type:         u8
/// height:            u64
/// round:             u32
/// block_id:          BlockId
/// timestamp:         i64 (unix ns)
/// validator_address: [u8; 20]
/// validator_index:   u32
/// signature:         u32 len + bytes
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    pub vote_type: SignedMsgType,
    pub height: u64,
    pub round: u32,
    pub block_id: BlockId,
    pub timestamp: Time,
    pub validator_address: Address,
    pub validator_index: u32,
    pub signature: Vec<u8>,
}

impl Vote {
    /// The canonical bytes a validator signs for this vote.
    ///
    /// Layout: domain tag, chain id (u16 len + bytes), vote_type, height,
    /// round, block_id, timestamp. The signature, validator address, and
    /// index are not part of the preimage.
    pub fn signing_preimage(&self, chain_id: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(VOTE_DOMAIN_TAG.len() + 2 + chain_id.len() + 64);
        put_bytes(&mut out, VOTE_DOMAIN_TAG);
        put_string(&mut out, chain_id);
        put_u8(&mut out, self.vote_type.as_u8());
        put_u64(&mut out, self.height);
        put_u32(&mut out, self.round);
        self.block_id.encode(&mut out);
        put_i64(&mut out, self.timestamp.as_unix_nanos());
        out
    }

    pub fn is_nil(&self) -> bool {
        self.block_id.is_zero()
    }

    pub fn validate_basic(&self) -> Result<(), WireError> {
        if self.vote_type == SignedMsgType::Proposal {
            return Err(WireError::InvalidValue("proposal type in vote"));
        }
        if self.height == 0 {
            return Err(WireError::InvalidValue("zero vote height"));
        }
        if self.signature.len() > MAX_SIGNATURE_LEN {
            return Err(WireError::TooLarge {
                actual: self.signature.len(),
                max: MAX_SIGNATURE_LEN,
            });
        }
        Ok(())
    }
}

impl WireEncode for Vote {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u8(out, self.vote_type.as_u8());
        put_u64(out, self.height);
        put_u32(out, self.round);
        self.block_id.encode(out);
        put_i64(out, self.timestamp.as_unix_nanos());
        put_bytes(out, &self.validator_address);
        put_u32(out, self.validator_index);
        put_var_bytes(out, &self.signature);
    }
}

impl WireDecode for Vote {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let vote_type = SignedMsgType::from_u8(get_u8(input)?)?;
        let height = get_u64(input)?;
        let round = get_u32(input)?;
        let block_id = BlockId::decode(input)?;
        let timestamp = Time::from_unix_nanos(get_i64(input)?);
        let validator_address = get_address(input)?;
        let validator_index = get_u32(input)?;
        let signature = get_var_bytes(input, MAX_SIGNATURE_LEN)?;
        Ok(Vote {
            vote_type,
            height,
            round,
            block_id,
            timestamp,
            validator_address,
            validator_index,
            signature,
        })
    }
}

impl std::fmt::Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Vote{{{:?} h={} r={} val={}}}",
            self.vote_type,
            self.height,
            self.round,
            to_hex(&self.validator_address)
        )
    }
}

// ============================================================================
// Proposal
// ============================================================================

/// A block proposal for a height/round.
///
/// `pol_round` is the proof-of-lock round, or -1 when the proposer is not
/// locked on a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub height: u64,
    pub round: u32,
    pub pol_round: i64,
    pub block_id: BlockId,
    pub timestamp: Time,
    pub signature: Vec<u8>,
}

impl Proposal {
    /// The canonical bytes a validator signs for this proposal.
    pub fn signing_preimage(&self, chain_id: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(PROPOSAL_DOMAIN_TAG.len() + 2 + chain_id.len() + 72);
        put_bytes(&mut out, PROPOSAL_DOMAIN_TAG);
        put_string(&mut out, chain_id);
        put_u64(&mut out, self.height);
        put_u32(&mut out, self.round);
        put_i64(&mut out, self.pol_round);
        self.block_id.encode(&mut out);
        put_i64(&mut out, self.timestamp.as_unix_nanos());
        out
    }

    pub fn validate_basic(&self) -> Result<(), WireError> {
        if self.height == 0 {
            return Err(WireError::InvalidValue("zero proposal height"));
        }
        if self.pol_round < -1 {
            return Err(WireError::InvalidValue("proposal pol_round below -1"));
        }
        if self.signature.len() > MAX_SIGNATURE_LEN {
            return Err(WireError::TooLarge {
                actual: self.signature.len(),
                max: MAX_SIGNATURE_LEN,
            });
        }
        Ok(())
    }
}

impl WireEncode for Proposal {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u64(out, self.height);
        put_u32(out, self.round);
        put_i64(out, self.pol_round);
        self.block_id.encode(out);
        put_i64(out, self.timestamp.as_unix_nanos());
        put_var_bytes(out, &self.signature);
    }
}

impl WireDecode for Proposal {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let height = get_u64(input)?;
        let round = get_u32(input)?;
        let pol_round = get_i64(input)?;
        let block_id = BlockId::decode(input)?;
        let timestamp = Time::from_unix_nanos(get_i64(input)?);
        let signature = get_var_bytes(input, MAX_SIGNATURE_LEN)?;
        Ok(Proposal {
            height,
            round,
            pol_round,
            block_id,
            timestamp,
            signature,
        })
    }
}

// MAX_CHAIN_ID_LEN is re-checked here so a hostile preimage request cannot
// inflate buffers; message-level decoding enforces the same bound.
const _: () = assert!(MAX_CHAIN_ID_LEN <= u16::MAX as usize);

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vote() -> Vote {
        Vote {
            vote_type: SignedMsgType::Precommit,
            height: 12,
            round: 1,
            block_id: BlockId {
                hash: [7u8; 32],
                part_set_header: Default::default(),
            },
            timestamp: Time::from_unix_secs(99),
            validator_address: [3u8; 20],
            validator_index: 0,
            signature: vec![1, 2, 3],
        }
    }

    #[test]
    fn vote_roundtrip() {
        let vote = sample_vote();
        let decoded = Vote::decode_exact(&vote.encode_to_vec()).expect("roundtrip");
        assert_eq!(decoded, vote);
    }

    #[test]
    fn preimage_binds_chain_id() {
        let vote = sample_vote();
        assert_ne!(
            vote.signing_preimage("chain-a"),
            vote.signing_preimage("chain-b")
        );
    }

    #[test]
    fn preimage_excludes_signature() {
        let mut vote = sample_vote();
        let before = vote.signing_preimage("chain-a");
        vote.signature = vec![9; 64];
        assert_eq!(before, vote.signing_preimage("chain-a"));
    }

    #[test]
    fn proposal_roundtrip() {
        let proposal = Proposal {
            height: 4,
            round: 0,
            pol_round: -1,
            block_id: BlockId {
                hash: [1u8; 32],
                part_set_header: Default::default(),
            },
            timestamp: Time::from_unix_secs(5),
            signature: vec![4; 64],
        };
        let decoded = Proposal::decode_exact(&proposal.encode_to_vec()).expect("roundtrip");
        assert_eq!(decoded, proposal);
    }
}
