//! Contract-table coverage of the remote signer request handler.

use veris_crypto::Keypair;
use veris_privval::{handle_signer_request, HandlerError, LocalSigner, PrivValidator};
use veris_types::Time;
use veris_wire::block::BlockId;
use veris_wire::consensus::{Proposal, SignedMsgType, Vote};
use veris_wire::privval::SignerMessage;

const CHAIN_A: &str = "chain-a";
const CHAIN_B: &str = "chain-b";

fn signer() -> LocalSigner {
    LocalSigner::new(Keypair::generate())
}

fn sample_vote() -> Vote {
    Vote {
        vote_type: SignedMsgType::Precommit,
        height: 2,
        round: 0,
        block_id: BlockId {
            hash: [3u8; 32],
            part_set_header: Default::default(),
        },
        timestamp: Time::from_unix_secs(11),
        validator_address: [1u8; 20],
        validator_index: 0,
        signature: Vec::new(),
    }
}

fn sample_proposal() -> Proposal {
    Proposal {
        height: 2,
        round: 0,
        pol_round: -1,
        block_id: BlockId {
            hash: [3u8; 32],
            part_set_header: Default::default(),
        },
        timestamp: Time::from_unix_secs(11),
        signature: Vec::new(),
    }
}

// ============================================================================
// Success paths
// ============================================================================

#[test]
fn pub_key_request_returns_key() {
    let signer = signer();
    let expected = signer.get_pub_key().unwrap();
    let response = handle_signer_request(
        &signer,
        SignerMessage::PubKeyRequest {
            chain_id: CHAIN_A.to_string(),
        },
        CHAIN_A,
    )
    .expect("handled");
    match response {
        SignerMessage::PubKeyResponse {
            pub_key: Some(pub_key),
            error: None,
        } => assert_eq!(pub_key, expected),
        other => panic!("unexpected response {:?}", other.kind()),
    }
}

#[test]
fn sign_vote_returns_vote_with_verifiable_signature() {
    let signer = signer();
    let response = handle_signer_request(
        &signer,
        SignerMessage::SignVoteRequest {
            chain_id: CHAIN_A.to_string(),
            vote: sample_vote(),
        },
        CHAIN_A,
    )
    .expect("handled");

    let SignerMessage::SignedVoteResponse {
        vote: Some(vote),
        error: None,
    } = response
    else {
        panic!("expected signed vote response");
    };
    assert!(!vote.signature.is_empty());
    signer
        .get_pub_key()
        .unwrap()
        .verify(&vote.signing_preimage(CHAIN_A), &vote.signature)
        .expect("signature verifies against the handler's pubkey");
}

#[test]
fn sign_proposal_returns_signed_proposal() {
    let signer = signer();
    let response = handle_signer_request(
        &signer,
        SignerMessage::SignProposalRequest {
            chain_id: CHAIN_A.to_string(),
            proposal: sample_proposal(),
        },
        CHAIN_A,
    )
    .expect("handled");

    let SignerMessage::SignedProposalResponse {
        proposal: Some(proposal),
        error: None,
    } = response
    else {
        panic!("expected signed proposal response");
    };
    signer
        .get_pub_key()
        .unwrap()
        .verify(&proposal.signing_preimage(CHAIN_A), &proposal.signature)
        .expect("proposal signature verifies");
}

#[test]
fn ping_request_pongs() {
    let response =
        handle_signer_request(&signer(), SignerMessage::PingRequest, CHAIN_A).expect("handled");
    assert_eq!(response, SignerMessage::PingResponse);
}

// ============================================================================
// Chain-id mismatches
// ============================================================================

#[test]
fn sign_vote_chain_mismatch() {
    let err = handle_signer_request(
        &signer(),
        SignerMessage::SignVoteRequest {
            chain_id: CHAIN_B.to_string(),
            vote: sample_vote(),
        },
        CHAIN_A,
    )
    .unwrap_err();

    let HandlerError::ChainIdMismatch {
        ours,
        theirs,
        response,
    } = err
    else {
        panic!("expected chain id mismatch");
    };
    assert_eq!(ours, CHAIN_A);
    assert_eq!(theirs, CHAIN_B);
    // The dispatcher error names both chain ids for the supervisor.
    let rendered = HandlerError::ChainIdMismatch {
        ours,
        theirs,
        response: response.clone(),
    }
    .to_string();
    assert!(rendered.contains(CHAIN_A) && rendered.contains(CHAIN_B));

    match *response {
        SignerMessage::SignedVoteResponse {
            vote: None,
            error: Some(err),
        } => assert_eq!(err.description, "unable to sign vote"),
        other => panic!("unexpected mismatch envelope {:?}", other.kind()),
    }
}

#[test]
fn sign_proposal_chain_mismatch() {
    let err = handle_signer_request(
        &signer(),
        SignerMessage::SignProposalRequest {
            chain_id: CHAIN_B.to_string(),
            proposal: sample_proposal(),
        },
        CHAIN_A,
    )
    .unwrap_err();

    let HandlerError::ChainIdMismatch { response, .. } = err else {
        panic!("expected chain id mismatch");
    };
    match *response {
        SignerMessage::SignedProposalResponse {
            proposal: None,
            error: Some(err),
        } => assert_eq!(err.description, "unable to sign proposal"),
        other => panic!("unexpected mismatch envelope {:?}", other.kind()),
    }
}

#[test]
fn pub_key_chain_mismatch_answers_in_kind() {
    let err = handle_signer_request(
        &signer(),
        SignerMessage::PubKeyRequest {
            chain_id: CHAIN_B.to_string(),
        },
        CHAIN_A,
    )
    .unwrap_err();

    let HandlerError::ChainIdMismatch { response, .. } = err else {
        panic!("expected chain id mismatch");
    };
    // The error envelope matches the request type.
    match *response {
        SignerMessage::PubKeyResponse {
            pub_key: None,
            error: Some(err),
        } => assert_eq!(err.description, "unable to provide pubkey"),
        other => panic!("unexpected mismatch envelope {:?}", other.kind()),
    }
}

// ============================================================================
// Signer errors travel in-band
// ============================================================================

#[test]
fn double_sign_refusal_is_an_in_band_error() {
    let signer = signer();
    handle_signer_request(
        &signer,
        SignerMessage::SignVoteRequest {
            chain_id: CHAIN_A.to_string(),
            vote: sample_vote(),
        },
        CHAIN_A,
    )
    .expect("first sign");

    // Same height/round/step with a different block: the signer refuses,
    // but the dispatch itself succeeds and the connection stays usable.
    let mut conflicting = sample_vote();
    conflicting.block_id = BlockId::default();
    let response = handle_signer_request(
        &signer,
        SignerMessage::SignVoteRequest {
            chain_id: CHAIN_A.to_string(),
            vote: conflicting,
        },
        CHAIN_A,
    )
    .expect("dispatch still succeeds");

    match response {
        SignerMessage::SignedVoteResponse {
            vote: None,
            error: Some(err),
        } => assert!(err.description.contains("conflicting data")),
        other => panic!("unexpected response {:?}", other.kind()),
    }
}

// ============================================================================
// Unknown requests
// ============================================================================

#[test]
fn response_variants_are_unknown_requests() {
    let messages = [
        SignerMessage::PingResponse,
        SignerMessage::SignedVoteResponse {
            vote: None,
            error: None,
        },
        SignerMessage::PubKeyResponse {
            pub_key: None,
            error: None,
        },
    ];
    for message in messages {
        let err = handle_signer_request(&signer(), message, CHAIN_A).unwrap_err();
        assert!(matches!(err, HandlerError::UnknownRequest { .. }));
    }
}
