//! Bounded, best-effort pub/sub for executor events.
//!
//! Event publication is advisory: a slow or dead subscriber must never stall
//! block processing. Each subscription owns a bounded ring buffer; when a
//! buffer is full the oldest event is dropped to make room, and the
//! publisher never blocks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::events::{EventData, Query};

/// Default per-subscriber buffer capacity.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 128;

struct SubBuffer {
    queue: Mutex<SubQueue>,
    available: Condvar,
    capacity: usize,
}

struct SubQueue {
    events: VecDeque<Arc<EventData>>,
    /// Events discarded because the buffer was full.
    dropped: u64,
    closed: bool,
}

struct SubEntry {
    query: Query,
    buffer: Arc<SubBuffer>,
}

/// The event bus. Cheap to clone; all clones publish into the same set of
/// subscriptions.
#[derive(Clone, Default)]
pub struct EventBus {
    subscriptions: Arc<RwLock<Vec<SubEntry>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription for events matching `query`.
    pub fn subscribe(&self, query: Query, capacity: usize) -> Subscription {
        let buffer = Arc::new(SubBuffer {
            queue: Mutex::new(SubQueue {
                events: VecDeque::with_capacity(capacity.min(DEFAULT_SUBSCRIPTION_CAPACITY)),
                dropped: 0,
                closed: false,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
        });
        self.subscriptions.write().push(SubEntry {
            query,
            buffer: Arc::clone(&buffer),
        });
        Subscription { buffer }
    }

    /// Deliver an event to every matching subscription. Never blocks; full
    /// buffers drop their oldest event, closed ones are pruned.
    pub fn publish(&self, event: EventData) {
        let attributes = event.attributes();
        let event = Arc::new(event);
        let mut prune = false;
        {
            let subscriptions = self.subscriptions.read();
            for entry in subscriptions.iter() {
                if !entry.query.matches(&attributes) {
                    continue;
                }
                let mut queue = entry.buffer.queue.lock();
                if queue.closed {
                    prune = true;
                    continue;
                }
                if queue.events.len() >= entry.buffer.capacity {
                    queue.events.pop_front();
                    queue.dropped += 1;
                }
                queue.events.push_back(Arc::clone(&event));
                entry.buffer.available.notify_one();
            }
        }
        if prune {
            self.subscriptions
                .write()
                .retain(|entry| !entry.buffer.queue.lock().closed);
        }
    }

    /// Number of live subscriptions, for tests.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// A handle to one subscription's buffered events. Dropping it closes the
/// subscription; the bus prunes it on the next publish.
pub struct Subscription {
    buffer: Arc<SubBuffer>,
}

impl Subscription {
    /// Take the next event if one is already buffered.
    pub fn try_recv(&self) -> Option<Arc<EventData>> {
        self.buffer.queue.lock().events.pop_front()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<EventData>> {
        let mut queue = self.buffer.queue.lock();
        if let Some(event) = queue.events.pop_front() {
            return Some(event);
        }
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self
                .buffer
                .available
                .wait_until(&mut queue, deadline)
                .timed_out()
            {
                return queue.events.pop_front();
            }
            if let Some(event) = queue.events.pop_front() {
                return Some(event);
            }
        }
    }

    /// How many events this subscription has lost to the bounded buffer.
    pub fn dropped(&self) -> u64 {
        self.buffer.queue.lock().dropped
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.buffer.queue.lock().closed = true;
    }
}
