//! End-to-end coverage of the block execution pipeline against an
//! in-process test application.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use veris_app::{
    AbciEvidence, AbciEvidenceKind, AbciValidator, AppConnConsensus, AppConnError, Application,
    LocalAppConn, RequestBeginBlock, RequestDeliverTx, RequestEndBlock, ResponseBeginBlock,
    ResponseCommit, ResponseDeliverTx, ResponseEndBlock, VoteInfo,
};
use veris_consensus::{
    ConsensusParams, ConsensusParamsUpdate, Validator, ValidatorSet, ValidatorSetError,
    ValidatorUpdate, VersionParams,
};
use veris_crypto::Keypair;
use veris_state::{
    AppResponseError, BlockExecutor, EventBus, EventData, EvidencePool, EvidencePoolError,
    ExecutionError, InMemoryMempool, MemoryStateStore, Mempool, NoopEvidencePool, NoopMempool,
    Query, State, StateStore,
};
use veris_types::Time;
use veris_wire::block::{Block, BlockId, Commit, CommitSig, Evidence, PartSetHeader, Tx};

// ============================================================================
// Test application and helpers
// ============================================================================

/// What the application observed, shared with the test body.
#[derive(Default)]
struct Recorded {
    last_commit_votes: Vec<VoteInfo>,
    byzantine_validators: Vec<AbciEvidence>,
    delivered: Vec<Tx>,
    commits: u32,
}

struct TestApp {
    recorded: Arc<Mutex<Recorded>>,
    validator_updates: Vec<ValidatorUpdate>,
    consensus_param_updates: Option<ConsensusParamsUpdate>,
    retain_height: u64,
}

impl TestApp {
    fn new(recorded: Arc<Mutex<Recorded>>) -> Self {
        TestApp {
            recorded,
            validator_updates: Vec::new(),
            // The test app advertises app version 1 on the first block.
            consensus_param_updates: Some(ConsensusParamsUpdate {
                version: Some(VersionParams { app_version: 1 }),
                ..Default::default()
            }),
            retain_height: 1,
        }
    }
}

impl Application for TestApp {
    fn begin_block(&mut self, req: RequestBeginBlock) -> ResponseBeginBlock {
        let mut recorded = self.recorded.lock();
        recorded.last_commit_votes = req.last_commit_info.votes;
        recorded.byzantine_validators = req.byzantine_validators;
        ResponseBeginBlock::default()
    }

    fn deliver_tx(&mut self, req: RequestDeliverTx) -> ResponseDeliverTx {
        self.recorded.lock().delivered.push(req.tx.clone());
        ResponseDeliverTx {
            code: 0,
            data: req.tx,
            ..ResponseDeliverTx::default()
        }
    }

    fn end_block(&mut self, _req: RequestEndBlock) -> ResponseEndBlock {
        ResponseEndBlock {
            validator_updates: self.validator_updates.clone(),
            consensus_param_updates: self.consensus_param_updates.clone(),
            events: Vec::new(),
        }
    }

    fn commit(&mut self) -> ResponseCommit {
        self.recorded.lock().commits += 1;
        ResponseCommit {
            data: vec![0xAB; 8],
            retain_height: self.retain_height,
        }
    }
}

fn make_genesis_state(n_vals: usize) -> (State, Vec<Keypair>) {
    let keypairs: Vec<Keypair> = (0..n_vals).map(|_| Keypair::generate()).collect();
    let validators = keypairs
        .iter()
        .map(|kp| Validator::new(kp.public_key(), 10))
        .collect();
    let set = ValidatorSet::new(validators).expect("genesis set");
    let state = State::genesis(
        "execution-chain",
        1,
        Time::from_unix_secs(1_700_000_000),
        set,
        ConsensusParams::default(),
        Vec::new(),
    )
    .expect("genesis state");
    (state, keypairs)
}

fn make_block(state: &State, height: u64, txs: Vec<Tx>, last_commit: Commit) -> (Block, BlockId) {
    let time = Time::from_unix_nanos(state.last_block_time.as_unix_nanos() + 1_000_000_000);
    let block = state.make_block(height, time, txs, Vec::new(), last_commit);
    let block_id = BlockId {
        hash: block.hash(),
        part_set_header: PartSetHeader {
            total: 1,
            hash: block.hash(),
        },
    };
    (block, block_id)
}

fn make_txs(height: u64, count: u8) -> Vec<Tx> {
    (0..count).map(|i| vec![height as u8, i]).collect()
}

struct Harness {
    executor: BlockExecutor,
    recorded: Arc<Mutex<Recorded>>,
    store: Arc<MemoryStateStore>,
}

fn make_harness(configure: impl FnOnce(&mut TestApp)) -> Harness {
    make_harness_with(configure, Arc::new(NoopMempool), Arc::new(NoopEvidencePool))
}

fn make_harness_with(
    configure: impl FnOnce(&mut TestApp),
    mempool: Arc<dyn Mempool>,
    evidence_pool: Arc<dyn EvidencePool>,
) -> Harness {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let mut app = TestApp::new(Arc::clone(&recorded));
    configure(&mut app);
    let store = Arc::new(MemoryStateStore::new());
    let executor = BlockExecutor::new(
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::new(LocalAppConn::new(app)),
        mempool,
        evidence_pool,
    );
    Harness {
        executor,
        recorded,
        store,
    }
}

// ============================================================================
// Baseline: one block through the pipeline
// ============================================================================

#[test]
fn apply_block_baseline() {
    let (state, _) = make_genesis_state(1);
    let harness = make_harness(|_| {});

    let (block, block_id) = make_block(&state, 1, make_txs(1, 10), Commit::default());
    let (new_state, retain_height) = harness
        .executor
        .apply_block(&state, &block_id, &block)
        .expect("apply");

    assert_eq!(retain_height, 1);
    assert_eq!(
        new_state.version.consensus.app, 1,
        "app version advertised by the test app was not adopted"
    );
    assert_eq!(new_state.last_block_height, 1);
    assert_eq!(new_state.last_block_id, block_id);
    assert_eq!(new_state.last_validators, state.validators);
    assert_eq!(new_state.validators, state.next_validators);
    // An empty diff leaves look-ahead membership untouched; only the
    // proposer schedule advanced.
    assert_eq!(
        new_state.next_validators.hash(),
        state.next_validators.hash()
    );
    new_state.validate().expect("invariants hold");

    let recorded = harness.recorded.lock();
    assert_eq!(recorded.delivered.len(), 10);
    assert_eq!(recorded.commits, 1);

    // The snapshot became durable before apply_block returned.
    let stored = harness.store.load().expect("load").expect("present");
    assert_eq!(stored, new_state);
}

// ============================================================================
// Last-commit absence reporting
// ============================================================================

#[test]
fn begin_block_reports_absent_validators() {
    let (state0, _) = make_genesis_state(2);
    let harness = make_harness(|_| {});

    let (block1, block1_id) = make_block(&state0, 1, make_txs(1, 2), Commit::default());
    let (state1, _) = harness
        .executor
        .apply_block(&state0, &block1_id, &block1)
        .expect("height 1");

    let vals = state1.last_validators.validators();
    let for_block = |idx: usize| CommitSig::ForBlock {
        validator_address: vals[idx].address,
        timestamp: Time::from_unix_secs(1_700_000_001),
        signature: vec![1; 64],
    };

    let cases: Vec<(Vec<CommitSig>, [bool; 2])> = vec![
        (vec![for_block(0), for_block(1)], [true, true]),
        (vec![for_block(0), CommitSig::Absent], [true, false]),
        (vec![CommitSig::Absent, CommitSig::Absent], [false, false]),
    ];

    for (signatures, expected) in cases {
        let last_commit = Commit {
            height: 1,
            round: 0,
            block_id: state1.last_block_id,
            signatures,
        };
        let (block2, block2_id) = make_block(&state1, 2, make_txs(2, 1), last_commit);
        harness
            .executor
            .apply_block(&state1, &block2_id, &block2)
            .expect("height 2");

        let recorded = harness.recorded.lock();
        let flags: Vec<bool> = recorded
            .last_commit_votes
            .iter()
            .map(|v| v.signed_last_block)
            .collect();
        assert_eq!(flags, expected);
        // Reported in the order of the attributed validator set.
        for (vote, validator) in recorded.last_commit_votes.iter().zip(vals.iter()) {
            assert_eq!(vote.validator.address, validator.address);
            assert_eq!(vote.validator.power, validator.voting_power);
        }
    }
}

// ============================================================================
// Byzantine evidence forwarding
// ============================================================================

struct StubEvidencePool {
    records: Vec<AbciEvidence>,
}

impl EvidencePool for StubEvidencePool {
    fn abci_evidence(&self, _height: u64, _evidence: &[Evidence]) -> Vec<AbciEvidence> {
        self.records.clone()
    }

    fn check_evidence(&self, _evidence: &[Evidence]) -> Result<(), EvidencePoolError> {
        Ok(())
    }

    fn update(&self, _state: &State) {}
}

#[test]
fn begin_block_forwards_byzantine_validators() {
    let (state, _) = make_genesis_state(1);
    let offender = AbciValidator {
        address: state.validators.validators()[0].address,
        power: 10,
    };
    let evidence_time = Time::from_unix_secs(1_546_300_800);
    let records = vec![
        AbciEvidence {
            kind: AbciEvidenceKind::DuplicateVote,
            validator: offender.clone(),
            height: 3,
            time: evidence_time,
            total_voting_power: 33,
        },
        AbciEvidence {
            kind: AbciEvidenceKind::LightClientAttack,
            validator: offender,
            height: 8,
            time: evidence_time,
            total_voting_power: 12,
        },
    ];

    let harness = make_harness_with(
        |_| {},
        Arc::new(NoopMempool),
        Arc::new(StubEvidencePool {
            records: records.clone(),
        }),
    );

    let (block, block_id) = make_block(&state, 1, make_txs(1, 1), Commit::default());
    let (_, retain_height) = harness
        .executor
        .apply_block(&state, &block_id, &block)
        .expect("apply");
    assert_eq!(retain_height, 1);

    let recorded = harness.recorded.lock();
    assert_eq!(recorded.byzantine_validators, records);
}

// ============================================================================
// Validator-set updates and events
// ============================================================================

#[test]
fn end_block_validator_updates_extend_next_validators() {
    let (state, _) = make_genesis_state(1);
    let new_kp = Keypair::generate();
    let harness = make_harness(|app| {
        app.validator_updates = vec![ValidatorUpdate {
            pub_key: new_kp.public_key(),
            power: 10,
        }];
    });

    let bus = EventBus::new();
    let subscription = bus.subscribe(Query::for_subject("ValidatorSetUpdates"), 8);
    let mut executor = harness.executor;
    executor.set_event_bus(bus);

    let (block, block_id) = make_block(&state, 1, make_txs(1, 1), Commit::default());
    let (new_state, _) = executor.apply_block(&state, &block_id, &block).expect("apply");

    assert_eq!(new_state.next_validators.len(), state.validators.len() + 1);
    assert!(new_state
        .next_validators
        .has_address(&new_kp.public_key().address()));
    // The change lands two heights after this block.
    assert_eq!(new_state.last_height_validators_changed, 1 + 1 + 1);
    // The current set is still the pre-diff look-ahead set.
    assert_eq!(new_state.validators.len(), state.validators.len());

    let event = subscription
        .recv_timeout(Duration::from_secs(1))
        .expect("validator set update event within 1s");
    match &*event {
        EventData::ValidatorSetUpdates { updates } => {
            assert_eq!(updates.len(), 1);
            assert_eq!(updates[0].pub_key, new_kp.public_key());
            assert_eq!(updates[0].power, 10);
        }
        other => panic!("unexpected event {:?}", other.subject()),
    }
}

#[test]
fn no_validator_update_event_without_updates() {
    let (state, _) = make_genesis_state(1);
    let harness = make_harness(|_| {});
    let bus = EventBus::new();
    let updates_sub = bus.subscribe(Query::for_subject("ValidatorSetUpdates"), 8);
    let block_sub = bus.subscribe(Query::for_subject("NewBlock"), 8);
    let tx_sub = bus.subscribe(Query::for_subject("Tx"), 8);
    let mut executor = harness.executor;
    executor.set_event_bus(bus);

    let (block, block_id) = make_block(&state, 1, make_txs(1, 2), Commit::default());
    executor.apply_block(&state, &block_id, &block).expect("apply");

    assert!(block_sub.recv_timeout(Duration::from_secs(1)).is_some());
    assert!(tx_sub.recv_timeout(Duration::from_secs(1)).is_some());
    assert!(tx_sub.recv_timeout(Duration::from_secs(1)).is_some());
    assert!(updates_sub.try_recv().is_none());
}

// ============================================================================
// Empty-set guard
// ============================================================================

#[test]
fn removing_sole_validator_errors_without_mutation() {
    let (state, keypairs) = make_genesis_state(1);
    let harness = make_harness(|app| {
        app.validator_updates = vec![ValidatorUpdate {
            pub_key: keypairs[0].public_key(),
            power: 0,
        }];
    });

    let (block, block_id) = make_block(&state, 1, make_txs(1, 1), Commit::default());
    let err = harness
        .executor
        .apply_block(&state, &block_id, &block)
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::InvalidAppResponse(AppResponseError::ValidatorSet(
            ValidatorSetError::EmptyValidatorSet
        ))
    ));
    assert!(!state.next_validators.is_empty());
    assert_eq!(state.last_block_height, 0, "state must be untouched");
    // Nothing was committed or saved.
    assert_eq!(harness.recorded.lock().commits, 0);
    assert!(harness.store.load().expect("load").is_none());
}

// ============================================================================
// Rejection paths
// ============================================================================

#[test]
fn wrong_height_is_invalid_block() {
    let (state, _) = make_genesis_state(1);
    let harness = make_harness(|_| {});

    let (block, block_id) = make_block(&state, 3, Vec::new(), Commit::default());
    let err = harness
        .executor
        .apply_block(&state, &block_id, &block)
        .unwrap_err();
    assert!(matches!(err, ExecutionError::InvalidBlock(_)));
    assert_eq!(harness.recorded.lock().commits, 0);
}

#[test]
fn wrong_chain_id_is_invalid_block() {
    let (state, _) = make_genesis_state(1);
    let harness = make_harness(|_| {});

    let (mut block, block_id) = make_block(&state, 1, Vec::new(), Commit::default());
    block.header.chain_id = "some-other-chain".to_string();
    let err = harness
        .executor
        .apply_block(&state, &block_id, &block)
        .unwrap_err();
    assert!(matches!(err, ExecutionError::InvalidBlock(_)));
}

/// A connection that fails at a chosen stage.
struct FailingConn {
    fail_on_deliver: bool,
}

impl AppConnConsensus for FailingConn {
    fn begin_block(&self, _req: RequestBeginBlock) -> Result<ResponseBeginBlock, AppConnError> {
        Ok(ResponseBeginBlock::default())
    }

    fn deliver_tx(&self, _req: RequestDeliverTx) -> Result<ResponseDeliverTx, AppConnError> {
        if self.fail_on_deliver {
            Err(AppConnError::Disconnected("app crashed".to_string()))
        } else {
            Ok(ResponseDeliverTx::default())
        }
    }

    fn end_block(&self, _req: RequestEndBlock) -> Result<ResponseEndBlock, AppConnError> {
        Ok(ResponseEndBlock::default())
    }

    fn commit(&self) -> Result<ResponseCommit, AppConnError> {
        Err(AppConnError::Disconnected("app crashed".to_string()))
    }
}

#[test]
fn transport_failure_is_proxy_app_error() {
    let (state, _) = make_genesis_state(1);
    let store = Arc::new(MemoryStateStore::new());
    let executor = BlockExecutor::new(
        Arc::clone(&store) as Arc<dyn StateStore>,
        Arc::new(FailingConn {
            fail_on_deliver: true,
        }),
        Arc::new(NoopMempool),
        Arc::new(NoopEvidencePool),
    );

    let (block, block_id) = make_block(&state, 1, make_txs(1, 1), Commit::default());
    let err = executor.apply_block(&state, &block_id, &block).unwrap_err();
    assert!(matches!(err, ExecutionError::ProxyApp(_)));
    assert!(store.load().expect("load").is_none(), "nothing persisted");
}

// ============================================================================
// Mempool reconciliation
// ============================================================================

#[test]
fn committed_txs_are_evicted_from_mempool() {
    let (state, _) = make_genesis_state(1);
    let mempool = Arc::new(InMemoryMempool::new());
    mempool.check_tx(vec![1, 0]).unwrap();
    mempool.check_tx(vec![1, 1]).unwrap();
    mempool.check_tx(vec![9, 9]).unwrap();

    let harness = make_harness_with(
        |_| {},
        Arc::clone(&mempool) as Arc<dyn Mempool>,
        Arc::new(NoopEvidencePool),
    );

    let (block, block_id) = make_block(&state, 1, make_txs(1, 2), Commit::default());
    harness
        .executor
        .apply_block(&state, &block_id, &block)
        .expect("apply");

    // Only the uncommitted transaction survives.
    assert_eq!(mempool.reap(10), vec![vec![9, 9]]);
}

// ============================================================================
// Multi-height progression
// ============================================================================

#[test]
fn three_heights_roll_validator_sets_forward() {
    let (mut state, _) = make_genesis_state(3);
    let harness = make_harness(|app| {
        // Only the first block changes parameters.
        app.consensus_param_updates = None;
    });

    for height in 1u64..=3 {
        let last_commit = if height == 1 {
            Commit::default()
        } else {
            let signatures = state
                .last_validators
                .iter()
                .map(|v| CommitSig::ForBlock {
                    validator_address: v.address,
                    timestamp: state.last_block_time,
                    signature: vec![2; 64],
                })
                .collect();
            Commit {
                height: height - 1,
                round: 0,
                block_id: state.last_block_id,
                signatures,
            }
        };
        let (block, block_id) = make_block(&state, height, make_txs(height, 3), last_commit);
        let entry_validators = state.validators.clone();
        let entry_next = state.next_validators.clone();

        let (new_state, _) = harness
            .executor
            .apply_block(&state, &block_id, &block)
            .expect("apply");

        assert_eq!(new_state.last_block_height, height);
        assert_eq!(new_state.last_validators, entry_validators);
        assert_eq!(new_state.validators, entry_next);
        new_state.validate().expect("invariants");
        state = new_state;
    }

    assert_eq!(harness.recorded.lock().commits, 3);
}
