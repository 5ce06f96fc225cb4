//! Validator key service: the signer contract, a watermarked local signer,
//! and the detached remote-signer protocol machinery.
//!
//! The node consumes signing through the [`PrivValidator`] trait. The
//! in-process implementation is [`LocalSigner`], which enforces the
//! double-sign watermark and optionally persists it. The detached
//! deployment splits the same contract across a TCP link: the validator
//! runs a [`SignerClient`], and the key host runs a [`SignerServer`] that
//! dispatches decoded requests through [`handle_signer_request`].

pub mod client;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod server;
pub mod signer;

pub use client::SignerClient;
pub use endpoint::{EndpointError, SignerEndpoint};
pub use error::SignerError;
pub use handler::{handle_signer_request, HandlerError};
pub use server::{ServeError, SignerServer};
pub use signer::{LastSignState, LocalSigner, STEP_PRECOMMIT, STEP_PREVOTE, STEP_PROPOSE};

use veris_crypto::PublicKey;
use veris_wire::consensus::{Proposal, Vote};

/// The signer contract consumed by the consensus driver and served by the
/// remote signer handler.
///
/// Implementations maintain high-watermark state so that signing a vote or
/// proposal that would regress `(height, round, step)` is refused;
/// dispatchers above this trait do not police double-signing themselves.
pub trait PrivValidator: Send + Sync {
    /// The validator's public key. Cheap; callers may cache it.
    fn get_pub_key(&self) -> Result<PublicKey, SignerError>;

    /// Sign `vote` for `chain_id`, populating `vote.signature`.
    fn sign_vote(&self, chain_id: &str, vote: &mut Vote) -> Result<(), SignerError>;

    /// Sign `proposal` for `chain_id`, populating `proposal.signature`.
    fn sign_proposal(&self, chain_id: &str, proposal: &mut Proposal) -> Result<(), SignerError>;
}
