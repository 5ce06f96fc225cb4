//! State store contract tests against the in-memory backend.

use veris_app::{ResponseDeliverTx, ResponseEndBlock};
use veris_consensus::{ConsensusParams, Validator, ValidatorSet, ValidatorUpdate};
use veris_crypto::Keypair;
use veris_state::{AbciResponses, MemoryStateStore, State, StateStore};
use veris_types::Time;

fn sample_state(n_vals: usize) -> State {
    let validators = (0..n_vals)
        .map(|_| Validator::new(Keypair::generate().public_key(), 7))
        .collect();
    State::genesis(
        "store-chain",
        1,
        Time::from_unix_secs(1_700_000_000),
        ValidatorSet::new(validators).unwrap(),
        ConsensusParams::default(),
        vec![0xCC; 4],
    )
    .unwrap()
}

#[test]
fn fresh_store_is_empty() {
    let store = MemoryStateStore::new();
    assert!(store.load().unwrap().is_none());
    assert!(store.load_abci_responses(1).unwrap().is_none());
    assert!(store.load_validators(1).unwrap().is_none());
    assert!(store.load_consensus_params(1).unwrap().is_none());
}

#[test]
fn save_load_roundtrip_is_equal() {
    let store = MemoryStateStore::new();
    let state = sample_state(3);
    store.save(&state).unwrap();

    let loaded = store.load().unwrap().expect("state present");
    assert_eq!(loaded, state);
}

#[test]
fn save_records_per_height_companions() {
    let store = MemoryStateStore::new();
    let state = sample_state(2);
    store.save(&state).unwrap();

    // A genesis save fixes validators for heights 1 and 2 and parameters
    // for height 1.
    let vals_1 = store.load_validators(1).unwrap().expect("height 1");
    assert_eq!(vals_1, state.validators);
    let vals_2 = store.load_validators(2).unwrap().expect("height 2");
    assert_eq!(vals_2, state.next_validators);
    let params = store.load_consensus_params(1).unwrap().expect("params");
    assert_eq!(params, state.consensus_params);
}

#[test]
fn newer_save_replaces_state_but_keeps_history() {
    let store = MemoryStateStore::new();
    let genesis = sample_state(1);
    store.save(&genesis).unwrap();

    let mut advanced = genesis.clone();
    advanced.last_block_height = 1;
    advanced.last_validators = genesis.validators.clone();
    advanced.validators = genesis.next_validators.clone();
    store.save(&advanced).unwrap();

    assert_eq!(store.load().unwrap().unwrap().last_block_height, 1);
    // Height-1 validators recorded by the genesis save are still readable.
    assert!(store.load_validators(1).unwrap().is_some());
    assert!(store.load_validators(3).unwrap().is_some());
}

#[test]
fn abci_responses_roundtrip() {
    let store = MemoryStateStore::new();
    let responses = AbciResponses {
        deliver_txs: vec![
            ResponseDeliverTx {
                code: 0,
                data: vec![1, 2],
                ..Default::default()
            },
            ResponseDeliverTx {
                code: 5,
                data: Vec::new(),
                ..Default::default()
            },
        ],
        end_block: ResponseEndBlock {
            validator_updates: vec![ValidatorUpdate {
                pub_key: Keypair::generate().public_key(),
                power: 12,
            }],
            consensus_param_updates: None,
            events: Vec::new(),
        },
    };

    store.save_abci_responses(4, &responses).unwrap();
    let loaded = store.load_abci_responses(4).unwrap().expect("present");
    assert_eq!(loaded, responses);
    assert!(store.load_abci_responses(5).unwrap().is_none());
}
