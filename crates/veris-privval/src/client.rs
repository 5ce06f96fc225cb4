//! The node-side client for a detached signer: a [`PrivValidator`] that
//! round-trips every operation over the framed link.

use std::net::{TcpStream, ToSocketAddrs};

use parking_lot::Mutex;

use veris_crypto::PublicKey;
use veris_wire::consensus::{Proposal, Vote};
use veris_wire::privval::SignerMessage;

use crate::endpoint::{EndpointError, SignerEndpoint};
use crate::error::SignerError;
use crate::PrivValidator;

/// Remote [`PrivValidator`] over a signer link.
///
/// Requests are serialized through a mutex: the protocol has no request
/// ids, so correlation is strictly one-response-per-request in order.
pub struct SignerClient {
    endpoint: Mutex<SignerEndpoint>,
    chain_id: String,
}

impl SignerClient {
    /// Connect to a signer at `addr` for `chain_id`.
    pub fn connect(addr: impl ToSocketAddrs, chain_id: impl Into<String>) -> Result<Self, SignerError> {
        let stream = TcpStream::connect(addr).map_err(|e| SignerError::Io(e.to_string()))?;
        let endpoint = SignerEndpoint::new(stream).map_err(|e| SignerError::Io(e.to_string()))?;
        Ok(SignerClient::new(endpoint, chain_id))
    }

    /// Wrap an established endpoint.
    pub fn new(endpoint: SignerEndpoint, chain_id: impl Into<String>) -> Self {
        SignerClient {
            endpoint: Mutex::new(endpoint),
            chain_id: chain_id.into(),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Liveness probe.
    pub fn ping(&self) -> Result<(), SignerError> {
        match self.request(SignerMessage::PingRequest)? {
            SignerMessage::PingResponse => Ok(()),
            other => Err(SignerError::UnexpectedResponse(other.kind())),
        }
    }

    fn request(&self, message: SignerMessage) -> Result<SignerMessage, SignerError> {
        let mut endpoint = self.endpoint.lock();
        endpoint.write_message(&message).map_err(map_endpoint_err)?;
        endpoint.read_message().map_err(map_endpoint_err)
    }
}

fn map_endpoint_err(err: EndpointError) -> SignerError {
    SignerError::Io(err.to_string())
}

impl PrivValidator for SignerClient {
    fn get_pub_key(&self) -> Result<PublicKey, SignerError> {
        match self.request(SignerMessage::PubKeyRequest {
            chain_id: self.chain_id.clone(),
        })? {
            SignerMessage::PubKeyResponse {
                error: Some(err), ..
            } => Err(SignerError::Remote(err.description)),
            SignerMessage::PubKeyResponse {
                pub_key: Some(pub_key),
                ..
            } => Ok(pub_key),
            other => Err(SignerError::UnexpectedResponse(other.kind())),
        }
    }

    fn sign_vote(&self, chain_id: &str, vote: &mut Vote) -> Result<(), SignerError> {
        match self.request(SignerMessage::SignVoteRequest {
            chain_id: chain_id.to_string(),
            vote: vote.clone(),
        })? {
            SignerMessage::SignedVoteResponse {
                error: Some(err), ..
            } => Err(SignerError::Remote(err.description)),
            SignerMessage::SignedVoteResponse {
                vote: Some(signed), ..
            } => {
                *vote = signed;
                Ok(())
            }
            other => Err(SignerError::UnexpectedResponse(other.kind())),
        }
    }

    fn sign_proposal(&self, chain_id: &str, proposal: &mut Proposal) -> Result<(), SignerError> {
        match self.request(SignerMessage::SignProposalRequest {
            chain_id: chain_id.to_string(),
            proposal: proposal.clone(),
        })? {
            SignerMessage::SignedProposalResponse {
                error: Some(err), ..
            } => Err(SignerError::Remote(err.description)),
            SignerMessage::SignedProposalResponse {
                proposal: Some(signed),
                ..
            } => {
                *proposal = signed;
                Ok(())
            }
            other => Err(SignerError::UnexpectedResponse(other.kind())),
        }
    }
}

impl std::fmt::Debug for SignerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerClient")
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}
