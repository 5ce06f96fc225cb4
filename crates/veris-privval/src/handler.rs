//! The remote signer request handler: one decoded request in, one response
//! out, chain binding enforced before the signer is touched.

use veris_wire::privval::{RemoteSignerError, SignerMessage};

use crate::error::SignerError;
use crate::PrivValidator;

/// Dispatcher-level failures. Signer errors are not among them: those
/// travel in the response payload and leave the connection open.
#[derive(Debug)]
pub enum HandlerError {
    /// The request targeted a different chain. The response to send before
    /// dropping the session is carried along, so the connection supervisor
    /// can answer and then hang up.
    ChainIdMismatch {
        ours: String,
        theirs: String,
        response: Box<SignerMessage>,
    },
    /// A message arrived that is not a request.
    UnknownRequest { kind: &'static str },
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::ChainIdMismatch { ours, theirs, .. } => {
                write!(f, "chain id mismatch: want {:?}, got {:?}", ours, theirs)
            }
            HandlerError::UnknownRequest { kind } => {
                write!(f, "unknown request message: {}", kind)
            }
        }
    }
}

impl std::error::Error for HandlerError {}

fn signer_error(err: &SignerError) -> RemoteSignerError {
    RemoteSignerError::new(err.to_string())
}

/// Answer one signer request.
///
/// Chain-id enforcement is a hard precondition on every signing-capable
/// request: the mismatch response carries an in-band error payload *and*
/// the function returns `ChainIdMismatch`, so the caller both answers the
/// client and learns it should drop the session. Signer failures (most
/// importantly the double-sign watermark) are soft: they are reported only
/// in the response payload.
pub fn handle_signer_request(
    signer: &dyn PrivValidator,
    request: SignerMessage,
    chain_id: &str,
) -> Result<SignerMessage, HandlerError> {
    match request {
        SignerMessage::PubKeyRequest {
            chain_id: req_chain_id,
        } => {
            if req_chain_id != chain_id {
                return Err(HandlerError::ChainIdMismatch {
                    ours: chain_id.to_string(),
                    theirs: req_chain_id,
                    response: Box::new(SignerMessage::PubKeyResponse {
                        pub_key: None,
                        error: Some(RemoteSignerError::new("unable to provide pubkey")),
                    }),
                });
            }
            Ok(match signer.get_pub_key() {
                Ok(pub_key) => SignerMessage::PubKeyResponse {
                    pub_key: Some(pub_key),
                    error: None,
                },
                Err(err) => SignerMessage::PubKeyResponse {
                    pub_key: None,
                    error: Some(signer_error(&err)),
                },
            })
        }

        SignerMessage::SignVoteRequest {
            chain_id: req_chain_id,
            mut vote,
        } => {
            if req_chain_id != chain_id {
                return Err(HandlerError::ChainIdMismatch {
                    ours: chain_id.to_string(),
                    theirs: req_chain_id,
                    response: Box::new(SignerMessage::SignedVoteResponse {
                        vote: None,
                        error: Some(RemoteSignerError::new("unable to sign vote")),
                    }),
                });
            }
            Ok(match signer.sign_vote(chain_id, &mut vote) {
                Ok(()) => SignerMessage::SignedVoteResponse {
                    vote: Some(vote),
                    error: None,
                },
                Err(err) => SignerMessage::SignedVoteResponse {
                    vote: None,
                    error: Some(signer_error(&err)),
                },
            })
        }

        SignerMessage::SignProposalRequest {
            chain_id: req_chain_id,
            mut proposal,
        } => {
            if req_chain_id != chain_id {
                return Err(HandlerError::ChainIdMismatch {
                    ours: chain_id.to_string(),
                    theirs: req_chain_id,
                    response: Box::new(SignerMessage::SignedProposalResponse {
                        proposal: None,
                        error: Some(RemoteSignerError::new("unable to sign proposal")),
                    }),
                });
            }
            Ok(match signer.sign_proposal(chain_id, &mut proposal) {
                Ok(()) => SignerMessage::SignedProposalResponse {
                    proposal: Some(proposal),
                    error: None,
                },
                Err(err) => SignerMessage::SignedProposalResponse {
                    proposal: None,
                    error: Some(signer_error(&err)),
                },
            })
        }

        SignerMessage::PingRequest => Ok(SignerMessage::PingResponse),

        other => Err(HandlerError::UnknownRequest { kind: other.kind() }),
    }
}
