//! The in-process signer with a persisted double-sign watermark.
//!
//! The watermark records the last `(height, round, step)` signed along with
//! the exact bytes covered. Signing anything at or below the watermark is
//! refused, with one exception: a request for the identical bytes at the
//! identical position returns the stored signature again, so a restarted
//! caller can recover an answer it lost.

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use veris_crypto::Keypair;
use veris_wire::consensus::{Proposal, SignedMsgType, Vote};
use veris_wire::io::{
    get_u32, get_u64, get_u8, get_var_bytes, put_u32, put_u64, put_u8, put_var_bytes, WireDecode,
    WireEncode,
};
use veris_wire::WireError;

use crate::error::SignerError;
use crate::PrivValidator;

/// Step ordering within one height/round: a proposal precedes the votes.
pub const STEP_PROPOSE: u8 = 1;
pub const STEP_PREVOTE: u8 = 2;
pub const STEP_PRECOMMIT: u8 = 3;

fn vote_step(vote_type: SignedMsgType) -> u8 {
    match vote_type {
        SignedMsgType::Prevote => STEP_PREVOTE,
        SignedMsgType::Precommit => STEP_PRECOMMIT,
        // Votes never carry the proposal type; decoding rejects it.
        SignedMsgType::Proposal => STEP_PROPOSE,
    }
}

// ============================================================================
// LastSignState
// ============================================================================

/// The persisted high watermark.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LastSignState {
    pub height: u64,
    pub round: u32,
    pub step: u8,
    /// Bytes covered by the last signature.
    pub sign_bytes: Option<Vec<u8>>,
    pub signature: Option<Vec<u8>>,
}

/// Where the watermark comparison landed.
enum HrsCheck {
    /// Strictly beyond the watermark; signing advances it.
    Advance,
    /// Exactly at the watermark; only an identical re-sign is allowed.
    Same,
}

impl LastSignState {
    fn check_hrs(&self, height: u64, round: u32, step: u8) -> Result<HrsCheck, SignerError> {
        let regression = SignerError::DoubleSign {
            height,
            round,
            step,
        };
        match (
            height.cmp(&self.height),
            round.cmp(&self.round),
            step.cmp(&self.step),
        ) {
            (std::cmp::Ordering::Less, _, _) => Err(regression),
            (std::cmp::Ordering::Greater, _, _) => Ok(HrsCheck::Advance),
            (_, std::cmp::Ordering::Less, _) => Err(regression),
            (_, std::cmp::Ordering::Greater, _) => Ok(HrsCheck::Advance),
            (_, _, std::cmp::Ordering::Less) => Err(regression),
            (_, _, std::cmp::Ordering::Greater) => Ok(HrsCheck::Advance),
            _ => Ok(HrsCheck::Same),
        }
    }

    /// Load a watermark file, or the zero watermark if none exists yet.
    pub fn load(path: &Path) -> Result<Self, SignerError> {
        match std::fs::read(path) {
            Ok(bytes) => {
                LastSignState::decode_exact(&bytes).map_err(|e| SignerError::Io(e.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(LastSignState::default()),
            Err(err) => Err(SignerError::Io(err.to_string())),
        }
    }

    /// Persist atomically: write a temp file in the same directory, then
    /// rename over the target.
    pub fn save(&self, path: &Path) -> Result<(), SignerError> {
        let tmp = path.with_extension("tmp");
        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&self.encode_to_vec())?;
            file.sync_all()?;
            std::fs::rename(&tmp, path)
        };
        write().map_err(|e| SignerError::Io(e.to_string()))
    }
}

impl WireEncode for LastSignState {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u64(out, self.height);
        put_u32(out, self.round);
        put_u8(out, self.step);
        match &self.sign_bytes {
            Some(bytes) => {
                put_u8(out, 1);
                put_var_bytes(out, bytes);
            }
            None => put_u8(out, 0),
        }
        match &self.signature {
            Some(sig) => {
                put_u8(out, 1);
                put_var_bytes(out, sig);
            }
            None => put_u8(out, 0),
        }
    }
}

impl WireDecode for LastSignState {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let height = get_u64(input)?;
        let round = get_u32(input)?;
        let step = get_u8(input)?;
        let sign_bytes = match get_u8(input)? {
            0 => None,
            1 => Some(get_var_bytes(input, 1 << 16)?),
            _ => return Err(WireError::InvalidValue("bad sign bytes flag")),
        };
        let signature = match get_u8(input)? {
            0 => None,
            1 => Some(get_var_bytes(input, 256)?),
            _ => return Err(WireError::InvalidValue("bad signature flag")),
        };
        Ok(LastSignState {
            height,
            round,
            step,
            sign_bytes,
            signature,
        })
    }
}

// ============================================================================
// LocalSigner
// ============================================================================

/// In-process [`PrivValidator`] backed by an ed25519 keypair.
pub struct LocalSigner {
    keypair: Keypair,
    state: Mutex<LastSignState>,
    state_file: Option<PathBuf>,
}

impl LocalSigner {
    /// A signer with an in-memory watermark. For tests and ephemeral keys;
    /// the watermark does not survive a restart.
    pub fn new(keypair: Keypair) -> Self {
        LocalSigner {
            keypair,
            state: Mutex::new(LastSignState::default()),
            state_file: None,
        }
    }

    /// A signer whose watermark persists at `state_file`. An existing file
    /// is loaded so a restart cannot re-sign past heights.
    pub fn with_state_file(keypair: Keypair, state_file: PathBuf) -> Result<Self, SignerError> {
        let state = LastSignState::load(&state_file)?;
        Ok(LocalSigner {
            keypair,
            state: Mutex::new(state),
            state_file: Some(state_file),
        })
    }

    /// Snapshot of the current watermark, for tests and diagnostics.
    pub fn last_sign_state(&self) -> LastSignState {
        self.state.lock().clone()
    }

    fn sign_at(
        &self,
        height: u64,
        round: u32,
        step: u8,
        sign_bytes: &[u8],
    ) -> Result<Vec<u8>, SignerError> {
        let mut state = self.state.lock();
        match state.check_hrs(height, round, step)? {
            HrsCheck::Same => {
                // Identical request at the watermark: hand back the stored
                // signature. Anything else at this position is an attempt
                // to sign two different payloads for the same slot.
                if state.sign_bytes.as_deref() == Some(sign_bytes) {
                    if let Some(signature) = &state.signature {
                        return Ok(signature.clone());
                    }
                }
                Err(SignerError::ConflictingData {
                    height,
                    round,
                    step,
                })
            }
            HrsCheck::Advance => {
                let signature = self.keypair.sign(sign_bytes);
                *state = LastSignState {
                    height,
                    round,
                    step,
                    sign_bytes: Some(sign_bytes.to_vec()),
                    signature: Some(signature.clone()),
                };
                if let Some(path) = &self.state_file {
                    // The watermark must be durable before the signature
                    // leaves this process.
                    state.save(path)?;
                }
                Ok(signature)
            }
        }
    }
}

impl PrivValidator for LocalSigner {
    fn get_pub_key(&self) -> Result<veris_crypto::PublicKey, SignerError> {
        Ok(self.keypair.public_key())
    }

    fn sign_vote(&self, chain_id: &str, vote: &mut Vote) -> Result<(), SignerError> {
        let step = vote_step(vote.vote_type);
        let sign_bytes = vote.signing_preimage(chain_id);
        let signature = self.sign_at(vote.height, vote.round, step, &sign_bytes)?;
        vote.signature = signature;
        Ok(())
    }

    fn sign_proposal(&self, chain_id: &str, proposal: &mut Proposal) -> Result<(), SignerError> {
        let sign_bytes = proposal.signing_preimage(chain_id);
        let signature =
            self.sign_at(proposal.height, proposal.round, STEP_PROPOSE, &sign_bytes)?;
        proposal.signature = signature;
        Ok(())
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("public_key", &self.keypair.public_key())
            .field("state_file", &self.state_file)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veris_types::Time;
    use veris_wire::block::BlockId;

    fn vote(height: u64, round: u32, vote_type: SignedMsgType) -> Vote {
        Vote {
            vote_type,
            height,
            round,
            block_id: BlockId {
                hash: [7u8; 32],
                part_set_header: Default::default(),
            },
            timestamp: Time::from_unix_secs(5),
            validator_address: [0u8; 20],
            validator_index: 0,
            signature: Vec::new(),
        }
    }

    #[test]
    fn signed_vote_verifies_against_pub_key() {
        let signer = LocalSigner::new(Keypair::generate());
        let mut v = vote(1, 0, SignedMsgType::Prevote);
        signer.sign_vote("chain-a", &mut v).expect("sign");
        assert!(!v.signature.is_empty());
        signer
            .get_pub_key()
            .unwrap()
            .verify(&v.signing_preimage("chain-a"), &v.signature)
            .expect("signature matches key");
    }

    #[test]
    fn watermark_blocks_height_regression() {
        let signer = LocalSigner::new(Keypair::generate());
        signer
            .sign_vote("chain-a", &mut vote(5, 0, SignedMsgType::Prevote))
            .unwrap();
        let err = signer
            .sign_vote("chain-a", &mut vote(4, 0, SignedMsgType::Prevote))
            .unwrap_err();
        assert!(matches!(err, SignerError::DoubleSign { height: 4, .. }));
    }

    #[test]
    fn watermark_blocks_step_regression() {
        let signer = LocalSigner::new(Keypair::generate());
        signer
            .sign_vote("chain-a", &mut vote(5, 0, SignedMsgType::Precommit))
            .unwrap();
        let err = signer
            .sign_vote("chain-a", &mut vote(5, 0, SignedMsgType::Prevote))
            .unwrap_err();
        assert!(matches!(err, SignerError::DoubleSign { .. }));
    }

    #[test]
    fn identical_resign_returns_stored_signature() {
        let signer = LocalSigner::new(Keypair::generate());
        let mut first = vote(5, 1, SignedMsgType::Prevote);
        signer.sign_vote("chain-a", &mut first).unwrap();

        let mut again = vote(5, 1, SignedMsgType::Prevote);
        signer.sign_vote("chain-a", &mut again).unwrap();
        assert_eq!(again.signature, first.signature);
    }

    #[test]
    fn conflicting_payload_at_watermark_refused() {
        let signer = LocalSigner::new(Keypair::generate());
        signer
            .sign_vote("chain-a", &mut vote(5, 1, SignedMsgType::Prevote))
            .unwrap();

        let mut conflicting = vote(5, 1, SignedMsgType::Prevote);
        conflicting.block_id = BlockId::default();
        let err = signer
            .sign_vote("chain-a", &mut conflicting)
            .unwrap_err();
        assert!(matches!(err, SignerError::ConflictingData { .. }));
    }

    #[test]
    fn proposal_then_votes_in_order() {
        let signer = LocalSigner::new(Keypair::generate());
        let mut proposal = Proposal {
            height: 3,
            round: 0,
            pol_round: -1,
            block_id: BlockId::default(),
            timestamp: Time::from_unix_secs(9),
            signature: Vec::new(),
        };
        signer.sign_proposal("chain-a", &mut proposal).expect("propose");
        signer
            .sign_vote("chain-a", &mut vote(3, 0, SignedMsgType::Prevote))
            .expect("prevote after proposal");
        // A proposal after the prevote regresses the step.
        let mut late = proposal.clone();
        late.timestamp = Time::from_unix_secs(10);
        assert!(matches!(
            signer.sign_proposal("chain-a", &mut late),
            Err(SignerError::DoubleSign { .. })
        ));
    }

    #[test]
    fn watermark_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermark.bin");
        let keypair = Keypair::generate();
        let seed = keypair.seed();

        {
            let signer = LocalSigner::with_state_file(keypair, path.clone()).unwrap();
            signer
                .sign_vote("chain-a", &mut vote(7, 0, SignedMsgType::Precommit))
                .unwrap();
        }

        let reborn =
            LocalSigner::with_state_file(Keypair::from_seed(&seed).unwrap(), path).unwrap();
        assert_eq!(reborn.last_sign_state().height, 7);
        let err = reborn
            .sign_vote("chain-a", &mut vote(6, 0, SignedMsgType::Prevote))
            .unwrap_err();
        assert!(matches!(err, SignerError::DoubleSign { .. }));
    }

    #[test]
    fn state_roundtrip() {
        let state = LastSignState {
            height: 9,
            round: 2,
            step: STEP_PRECOMMIT,
            sign_bytes: Some(vec![1, 2, 3]),
            signature: Some(vec![9; 64]),
        };
        let decoded = LastSignState::decode_exact(&state.encode_to_vec()).unwrap();
        assert_eq!(decoded, state);
    }
}
