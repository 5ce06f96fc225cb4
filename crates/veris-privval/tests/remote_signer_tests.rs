//! Client/server round trips over a real socket.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use veris_crypto::Keypair;
use veris_privval::{
    LocalSigner, PrivValidator, ServeError, SignerClient, SignerEndpoint, SignerServer,
};
use veris_types::Time;
use veris_wire::block::BlockId;
use veris_wire::consensus::{SignedMsgType, Vote};

const CHAIN: &str = "wire-chain";

fn sample_vote(height: u64) -> Vote {
    Vote {
        vote_type: SignedMsgType::Prevote,
        height,
        round: 0,
        block_id: BlockId {
            hash: [height as u8; 32],
            part_set_header: Default::default(),
        },
        timestamp: Time::from_unix_secs(100),
        validator_address: [2u8; 20],
        validator_index: 0,
        signature: Vec::new(),
    }
}

/// Start a server for one connection; returns the address and the serving
/// thread's result handle.
fn spawn_server(
    chain_id: &'static str,
    signer: Arc<dyn PrivValidator>,
) -> (std::net::SocketAddr, thread::JoinHandle<Result<(), ServeError>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut endpoint = SignerEndpoint::new(stream).expect("endpoint");
        SignerServer::new(chain_id, signer).serve_connection(&mut endpoint)
    });
    (addr, handle)
}

#[test]
fn full_session_over_tcp() {
    let keypair = Keypair::generate();
    let expected_pub_key = keypair.public_key();
    let (addr, server) = spawn_server(CHAIN, Arc::new(LocalSigner::new(keypair)));

    let client = SignerClient::connect(addr, CHAIN).expect("connect");

    client.ping().expect("ping");
    assert_eq!(client.get_pub_key().expect("pubkey"), expected_pub_key);

    let mut vote = sample_vote(1);
    client.sign_vote(CHAIN, &mut vote).expect("sign vote");
    expected_pub_key
        .verify(&vote.signing_preimage(CHAIN), &vote.signature)
        .expect("vote signature verifies against served pubkey");

    // Double-sign refusal arrives as a remote error, connection intact.
    let mut conflicting = sample_vote(1);
    conflicting.block_id = BlockId::default();
    let err = client.sign_vote(CHAIN, &mut conflicting).unwrap_err();
    assert!(matches!(err, veris_privval::SignerError::Remote(_)));

    // Link still serves afterwards.
    let mut next = sample_vote(2);
    client.sign_vote(CHAIN, &mut next).expect("next height");

    drop(client);
    server.join().expect("join").expect("clean shutdown");
}

#[test]
fn chain_mismatch_drops_session() {
    let (addr, server) = spawn_server(CHAIN, Arc::new(LocalSigner::new(Keypair::generate())));

    // Client bound to the wrong chain: the signing request is answered with
    // an in-band error and the server then drops the session.
    let client = SignerClient::connect(addr, "other-chain").expect("connect");
    let mut vote = sample_vote(1);
    let err = client.sign_vote("other-chain", &mut vote).unwrap_err();
    match err {
        veris_privval::SignerError::Remote(description) => {
            assert_eq!(description, "unable to sign vote")
        }
        other => panic!("unexpected error {:?}", other),
    }

    let serve_result = server.join().expect("join");
    let serve_err = serve_result.unwrap_err();
    let rendered = serve_err.to_string();
    assert!(
        rendered.contains(CHAIN) && rendered.contains("other-chain"),
        "supervisor error must name both chain ids: {}",
        rendered
    );
}

#[test]
fn concurrent_connections_share_one_watermark() {
    let signer: Arc<dyn PrivValidator> = Arc::new(LocalSigner::new(Keypair::generate()));
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server = thread::spawn(move || {
        let mut sessions = Vec::new();
        for _ in 0..2 {
            let (stream, _) = listener.accept().expect("accept");
            let session_server = SignerServer::new(CHAIN, Arc::clone(&signer));
            sessions.push(thread::spawn(move || {
                let mut endpoint = SignerEndpoint::new(stream).expect("endpoint");
                session_server.serve_connection(&mut endpoint)
            }));
        }
        for session in sessions {
            let _ = session.join().expect("session join");
        }
    });

    let client_a = SignerClient::connect(addr, CHAIN).expect("connect a");
    let client_b = SignerClient::connect(addr, CHAIN).expect("connect b");

    let mut vote = sample_vote(5);
    client_a.sign_vote(CHAIN, &mut vote).expect("a signs");

    // The same slot with different bytes through the other connection must
    // be refused: the watermark is per-signer, not per-connection.
    let mut conflicting = sample_vote(5);
    conflicting.block_id = BlockId::default();
    let err = client_b.sign_vote(CHAIN, &mut conflicting).unwrap_err();
    assert!(matches!(err, veris_privval::SignerError::Remote(_)));

    drop(client_a);
    drop(client_b);
    server.join().expect("server join");
}
