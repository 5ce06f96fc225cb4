//! Mempool adapter: transaction supply and post-commit eviction.
//!
//! The executor holds the mempool's lock from the start of the application
//! Commit through the end of `update`, so no CheckTx can admit a
//! transaction against a state view that is about to be replaced. The
//! lock/unlock pair is explicit rather than a guard because the critical
//! section spans two adapter calls with executor work in between.

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};

use veris_app::ResponseDeliverTx;
use veris_crypto::hash_bytes;
use veris_types::Hash32;
use veris_wire::block::Tx;

#[derive(Debug, thiserror::Error)]
pub enum MempoolError {
    /// The mempool is at capacity.
    #[error("mempool full")]
    Full,
    /// The transaction is already pending.
    #[error("transaction already in mempool")]
    Duplicate,
    /// The transaction failed admission checks.
    #[error("invalid transaction: {0}")]
    Invalid(String),
}

/// The mempool contract the executor consumes.
pub trait Mempool: Send + Sync {
    /// Enter the commit critical section. CheckTx blocks until `unlock`.
    fn lock(&self);

    /// Leave the commit critical section.
    fn unlock(&self);

    /// A block committed: evict its transactions and reconcile against the
    /// DeliverTx results. Called while the lock is held.
    fn update(
        &self,
        height: u64,
        txs: &[Tx],
        responses: &[ResponseDeliverTx],
    ) -> Result<(), MempoolError>;

    /// Admit a transaction. Must not run inside the commit window.
    fn check_tx(&self, tx: Tx) -> Result<(), MempoolError>;

    /// Up to `max_txs` pending transactions in admission order.
    fn reap(&self, max_txs: usize) -> Vec<Tx>;

    fn size(&self) -> usize;
}

// ============================================================================
// NoopMempool
// ============================================================================

/// A mempool that accepts and holds nothing. Used by tests and by
/// non-proposing tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMempool;

impl Mempool for NoopMempool {
    fn lock(&self) {}
    fn unlock(&self) {}

    fn update(
        &self,
        _height: u64,
        _txs: &[Tx],
        _responses: &[ResponseDeliverTx],
    ) -> Result<(), MempoolError> {
        Ok(())
    }

    fn check_tx(&self, _tx: Tx) -> Result<(), MempoolError> {
        Ok(())
    }

    fn reap(&self, _max_txs: usize) -> Vec<Tx> {
        Vec::new()
    }

    fn size(&self) -> usize {
        0
    }
}

// ============================================================================
// InMemoryMempool
// ============================================================================

#[derive(Clone, Debug)]
pub struct MempoolConfig {
    /// Maximum number of pending transactions.
    pub max_txs: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig { max_txs: 10_000 }
    }
}

struct MempoolInner {
    /// Pending transactions in admission order.
    txs: Vec<Tx>,
    /// Hashes of pending transactions, for duplicate rejection.
    seen: HashSet<Hash32>,
    /// Commit window flag; CheckTx waits while set.
    locked: bool,
}

/// FIFO in-memory mempool with duplicate rejection and a capacity cap.
pub struct InMemoryMempool {
    inner: Mutex<MempoolInner>,
    unlocked: Condvar,
    config: MempoolConfig,
}

impl InMemoryMempool {
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    pub fn with_config(config: MempoolConfig) -> Self {
        InMemoryMempool {
            inner: Mutex::new(MempoolInner {
                txs: Vec::new(),
                seen: HashSet::new(),
                locked: false,
            }),
            unlocked: Condvar::new(),
            config,
        }
    }
}

impl Default for InMemoryMempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool for InMemoryMempool {
    fn lock(&self) {
        let mut inner = self.inner.lock();
        while inner.locked {
            self.unlocked.wait(&mut inner);
        }
        inner.locked = true;
    }

    fn unlock(&self) {
        let mut inner = self.inner.lock();
        inner.locked = false;
        self.unlocked.notify_all();
    }

    fn update(
        &self,
        _height: u64,
        txs: &[Tx],
        _responses: &[ResponseDeliverTx],
    ) -> Result<(), MempoolError> {
        // Runs inside the commit window: the flag is ours, so take the data
        // lock directly rather than waiting on it.
        let mut inner = self.inner.lock();
        let committed: HashSet<Hash32> = txs.iter().map(|tx| hash_bytes(tx)).collect();
        inner.txs.retain(|tx| !committed.contains(&hash_bytes(tx)));
        for hash in &committed {
            inner.seen.remove(hash);
        }
        Ok(())
    }

    fn check_tx(&self, tx: Tx) -> Result<(), MempoolError> {
        let mut inner = self.inner.lock();
        while inner.locked {
            self.unlocked.wait(&mut inner);
        }
        if inner.txs.len() >= self.config.max_txs {
            return Err(MempoolError::Full);
        }
        let hash = hash_bytes(&tx);
        if !inner.seen.insert(hash) {
            return Err(MempoolError::Duplicate);
        }
        inner.txs.push(tx);
        Ok(())
    }

    fn reap(&self, max_txs: usize) -> Vec<Tx> {
        let inner = self.inner.lock();
        inner.txs.iter().take(max_txs).cloned().collect()
    }

    fn size(&self) -> usize {
        self.inner.lock().txs.len()
    }
}

impl std::fmt::Debug for InMemoryMempool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryMempool")
            .field("size", &self.size())
            .field("max_txs", &self.config.max_txs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn admission_and_reap_order() {
        let mempool = InMemoryMempool::new();
        mempool.check_tx(b"a".to_vec()).unwrap();
        mempool.check_tx(b"b".to_vec()).unwrap();
        assert_eq!(mempool.reap(10), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(mempool.reap(1), vec![b"a".to_vec()]);
    }

    #[test]
    fn duplicates_rejected_until_committed() {
        let mempool = InMemoryMempool::new();
        mempool.check_tx(b"a".to_vec()).unwrap();
        assert!(matches!(
            mempool.check_tx(b"a".to_vec()),
            Err(MempoolError::Duplicate)
        ));

        mempool.update(1, &[b"a".to_vec()], &[]).unwrap();
        assert_eq!(mempool.size(), 0);
        mempool.check_tx(b"a".to_vec()).expect("readmit after commit");
    }

    #[test]
    fn capacity_enforced() {
        let mempool = InMemoryMempool::with_config(MempoolConfig { max_txs: 1 });
        mempool.check_tx(b"a".to_vec()).unwrap();
        assert!(matches!(
            mempool.check_tx(b"b".to_vec()),
            Err(MempoolError::Full)
        ));
    }

    #[test]
    fn check_tx_blocks_during_commit_window() {
        let mempool = Arc::new(InMemoryMempool::new());
        mempool.lock();

        let worker = {
            let mempool = Arc::clone(&mempool);
            std::thread::spawn(move || mempool.check_tx(b"a".to_vec()))
        };

        // The admission must still be parked while the window is open.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(mempool.size(), 0);

        mempool.unlock();
        worker.join().unwrap().expect("admitted after unlock");
        assert_eq!(mempool.size(), 1);
    }
}
