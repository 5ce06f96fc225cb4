//! Remote signer protocol: the message union and its frame codec.
//!
//! The detached signer link carries length-prefixed frames, each holding one
//! message of the union below. Every request carries the chain id the client
//! believes it is signing for; the server enforces equality with its bound
//! chain id before touching the signer.
//!
//! Frame layout: u32 LE payload length, then the payload. The first payload
//! byte is the message type.

use veris_crypto::PublicKey;
use veris_types::MAX_CHAIN_ID_LEN;

use crate::consensus::{Proposal, Vote};
use crate::error::WireError;
use crate::io::{
    get_string, get_u32, get_u8, get_var_bytes, put_string, put_u32, put_u8, put_var_bytes,
    WireDecode, WireEncode,
};

/// Maximum accepted frame payload. Signer messages are small; anything
/// larger is a broken or hostile peer.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Maximum length of an error description string.
const MAX_ERROR_DESCRIPTION_LEN: usize = 1024;

/// Maximum length of a key-type name.
const MAX_KEY_TYPE_LEN: usize = 32;

const MSG_TYPE_PUB_KEY_REQUEST: u8 = 0x01;
const MSG_TYPE_PUB_KEY_RESPONSE: u8 = 0x02;
const MSG_TYPE_SIGN_VOTE_REQUEST: u8 = 0x03;
const MSG_TYPE_SIGNED_VOTE_RESPONSE: u8 = 0x04;
const MSG_TYPE_SIGN_PROPOSAL_REQUEST: u8 = 0x05;
const MSG_TYPE_SIGNED_PROPOSAL_RESPONSE: u8 = 0x06;
const MSG_TYPE_PING_REQUEST: u8 = 0x07;
const MSG_TYPE_PING_RESPONSE: u8 = 0x08;

// ============================================================================
// RemoteSignerError payload
// ============================================================================

/// Error payload carried inside signer responses.
///
/// This is the in-band error channel: the connection stays open, the caller
/// decides what to do with the description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteSignerError {
    pub code: u32,
    pub description: String,
}

impl RemoteSignerError {
    pub fn new(description: impl Into<String>) -> Self {
        RemoteSignerError {
            code: 0,
            description: description.into(),
        }
    }
}

impl WireEncode for RemoteSignerError {
    fn encode(&self, out: &mut Vec<u8>) {
        put_u32(out, self.code);
        put_string(out, &self.description);
    }
}

impl WireDecode for RemoteSignerError {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let code = get_u32(input)?;
        let description = get_string(input, MAX_ERROR_DESCRIPTION_LEN)?;
        Ok(RemoteSignerError { code, description })
    }
}

fn put_opt_error(out: &mut Vec<u8>, error: &Option<RemoteSignerError>) {
    match error {
        Some(err) => {
            put_u8(out, 1);
            err.encode(out);
        }
        None => put_u8(out, 0),
    }
}

fn get_opt_error(input: &mut &[u8]) -> Result<Option<RemoteSignerError>, WireError> {
    match get_u8(input)? {
        0 => Ok(None),
        1 => Ok(Some(RemoteSignerError::decode(input)?)),
        _ => Err(WireError::InvalidValue("bad error presence flag")),
    }
}

fn put_pub_key(out: &mut Vec<u8>, pub_key: &PublicKey) {
    put_string(out, pub_key.type_name());
    put_var_bytes(out, pub_key.as_bytes());
}

fn get_pub_key(input: &mut &[u8]) -> Result<PublicKey, WireError> {
    let key_type = get_string(input, MAX_KEY_TYPE_LEN)?;
    if key_type != veris_crypto::ED25519_KEY_TYPE {
        return Err(WireError::InvalidValue("unsupported key type"));
    }
    let bytes = get_var_bytes(input, veris_crypto::PUBLIC_KEY_SIZE)?;
    PublicKey::from_bytes(&bytes).map_err(|_| WireError::InvalidValue("bad public key bytes"))
}

// ============================================================================
// Message union
// ============================================================================

/// The message union carried over the signer link.
///
/// Request variants carry the client's chain id; response variants carry
/// either the result or an in-band `RemoteSignerError`, never both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignerMessage {
    PubKeyRequest {
        chain_id: String,
    },
    PubKeyResponse {
        pub_key: Option<PublicKey>,
        error: Option<RemoteSignerError>,
    },
    SignVoteRequest {
        chain_id: String,
        vote: Vote,
    },
    SignedVoteResponse {
        vote: Option<Vote>,
        error: Option<RemoteSignerError>,
    },
    SignProposalRequest {
        chain_id: String,
        proposal: Proposal,
    },
    SignedProposalResponse {
        proposal: Option<Proposal>,
        error: Option<RemoteSignerError>,
    },
    PingRequest,
    PingResponse,
}

impl SignerMessage {
    /// True for the four request variants.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            SignerMessage::PubKeyRequest { .. }
                | SignerMessage::SignVoteRequest { .. }
                | SignerMessage::SignProposalRequest { .. }
                | SignerMessage::PingRequest
        )
    }

    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SignerMessage::PubKeyRequest { .. } => "PubKeyRequest",
            SignerMessage::PubKeyResponse { .. } => "PubKeyResponse",
            SignerMessage::SignVoteRequest { .. } => "SignVoteRequest",
            SignerMessage::SignedVoteResponse { .. } => "SignedVoteResponse",
            SignerMessage::SignProposalRequest { .. } => "SignProposalRequest",
            SignerMessage::SignedProposalResponse { .. } => "SignedProposalResponse",
            SignerMessage::PingRequest => "PingRequest",
            SignerMessage::PingResponse => "PingResponse",
        }
    }
}

impl WireEncode for SignerMessage {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            SignerMessage::PubKeyRequest { chain_id } => {
                put_u8(out, MSG_TYPE_PUB_KEY_REQUEST);
                put_string(out, chain_id);
            }
            SignerMessage::PubKeyResponse { pub_key, error } => {
                put_u8(out, MSG_TYPE_PUB_KEY_RESPONSE);
                match pub_key {
                    Some(pk) => {
                        put_u8(out, 1);
                        put_pub_key(out, pk);
                    }
                    None => put_u8(out, 0),
                }
                put_opt_error(out, error);
            }
            SignerMessage::SignVoteRequest { chain_id, vote } => {
                put_u8(out, MSG_TYPE_SIGN_VOTE_REQUEST);
                put_string(out, chain_id);
                vote.encode(out);
            }
            SignerMessage::SignedVoteResponse { vote, error } => {
                put_u8(out, MSG_TYPE_SIGNED_VOTE_RESPONSE);
                match vote {
                    Some(v) => {
                        put_u8(out, 1);
                        v.encode(out);
                    }
                    None => put_u8(out, 0),
                }
                put_opt_error(out, error);
            }
            SignerMessage::SignProposalRequest { chain_id, proposal } => {
                put_u8(out, MSG_TYPE_SIGN_PROPOSAL_REQUEST);
                put_string(out, chain_id);
                proposal.encode(out);
            }
            SignerMessage::SignedProposalResponse { proposal, error } => {
                put_u8(out, MSG_TYPE_SIGNED_PROPOSAL_RESPONSE);
                match proposal {
                    Some(p) => {
                        put_u8(out, 1);
                        p.encode(out);
                    }
                    None => put_u8(out, 0),
                }
                put_opt_error(out, error);
            }
            SignerMessage::PingRequest => put_u8(out, MSG_TYPE_PING_REQUEST),
            SignerMessage::PingResponse => put_u8(out, MSG_TYPE_PING_RESPONSE),
        }
    }
}

impl WireDecode for SignerMessage {
    fn decode(input: &mut &[u8]) -> Result<Self, WireError> {
        let msg_type = get_u8(input)?;
        match msg_type {
            MSG_TYPE_PUB_KEY_REQUEST => Ok(SignerMessage::PubKeyRequest {
                chain_id: get_string(input, MAX_CHAIN_ID_LEN)?,
            }),
            MSG_TYPE_PUB_KEY_RESPONSE => {
                let pub_key = match get_u8(input)? {
                    0 => None,
                    1 => Some(get_pub_key(input)?),
                    _ => return Err(WireError::InvalidValue("bad pub key presence flag")),
                };
                let error = get_opt_error(input)?;
                Ok(SignerMessage::PubKeyResponse { pub_key, error })
            }
            MSG_TYPE_SIGN_VOTE_REQUEST => Ok(SignerMessage::SignVoteRequest {
                chain_id: get_string(input, MAX_CHAIN_ID_LEN)?,
                vote: Vote::decode(input)?,
            }),
            MSG_TYPE_SIGNED_VOTE_RESPONSE => {
                let vote = match get_u8(input)? {
                    0 => None,
                    1 => Some(Vote::decode(input)?),
                    _ => return Err(WireError::InvalidValue("bad vote presence flag")),
                };
                let error = get_opt_error(input)?;
                Ok(SignerMessage::SignedVoteResponse { vote, error })
            }
            MSG_TYPE_SIGN_PROPOSAL_REQUEST => Ok(SignerMessage::SignProposalRequest {
                chain_id: get_string(input, MAX_CHAIN_ID_LEN)?,
                proposal: Proposal::decode(input)?,
            }),
            MSG_TYPE_SIGNED_PROPOSAL_RESPONSE => {
                let proposal = match get_u8(input)? {
                    0 => None,
                    1 => Some(Proposal::decode(input)?),
                    _ => return Err(WireError::InvalidValue("bad proposal presence flag")),
                };
                let error = get_opt_error(input)?;
                Ok(SignerMessage::SignedProposalResponse { proposal, error })
            }
            MSG_TYPE_PING_REQUEST => Ok(SignerMessage::PingRequest),
            MSG_TYPE_PING_RESPONSE => Ok(SignerMessage::PingResponse),
            _ => Err(WireError::InvalidValue("unknown signer message type")),
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Encode a message into a length-prefixed frame.
pub fn encode_frame(msg: &SignerMessage) -> Result<Vec<u8>, WireError> {
    let payload = msg.encode_to_vec();
    if payload.len() > MAX_FRAME_SIZE {
        return Err(WireError::TooLarge {
            actual: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    put_u32(&mut frame, payload.len() as u32);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Parse a frame's length prefix, returning the payload length.
pub fn decode_frame_len(prefix: [u8; 4]) -> Result<usize, WireError> {
    let len = u32::from_le_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(WireError::TooLarge {
            actual: len,
            max: MAX_FRAME_SIZE,
        });
    }
    if len == 0 {
        return Err(WireError::InvalidValue("empty frame"));
    }
    Ok(len)
}
