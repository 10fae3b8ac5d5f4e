//! Per-session last-value cache of a node's observed state.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{trace, warn};

use beacon_sim_core::traits::{ChainNode, Scheduler, Worker};
use beacon_sim_core::types::{ObservedState, Slot};

/// Holds the newest [`ObservedState`] published by one node.
///
/// The mailbox subscribes to the node's stream and registers itself as a
/// worker on the session scheduler, so it is refreshed in the same drain
/// that made the node publish. Later deliveries overwrite earlier ones.
pub struct ObservedStateMailbox {
    node: String,
    rx: Mutex<broadcast::Receiver<ObservedState>>,
    latest: RwLock<Option<ObservedState>>,
    first_slot: OnceLock<Slot>,
    missed_before_first: AtomicU64,
}

impl ObservedStateMailbox {
    pub fn new(node: &dyn ChainNode) -> Self {
        Self {
            node: node.name().to_string(),
            rx: Mutex::new(node.observed_states()),
            latest: RwLock::new(None),
            first_slot: OnceLock::new(),
            missed_before_first: AtomicU64::new(0),
        }
    }

    /// Subscribe to `node` and register the mailbox on `scheduler`.
    pub fn attach(node: &dyn ChainNode, scheduler: &dyn Scheduler) -> Arc<Self> {
        let mailbox = Arc::new(Self::new(node));
        let name = format!("{}-observer", mailbox.node);
        scheduler.spawn_worker(&name, Arc::clone(&mailbox) as Arc<dyn Worker>);
        mailbox
    }

    pub fn latest(&self) -> Option<ObservedState> {
        self.latest.read().clone()
    }

    /// Slot of the latest slot state in the first delivered state. States
    /// the stream dropped before it are counted by [`Self::missed_before_first`].
    pub fn first_slot(&self) -> Option<Slot> {
        self.first_slot.get().copied()
    }

    /// States lost to lag before anything was delivered.
    pub fn missed_before_first(&self) -> u64 {
        self.missed_before_first.load(Ordering::Acquire)
    }

    fn deliver(&self, state: ObservedState) {
        let slot = state.latest_slot_state.slot;
        self.first_slot.get_or_init(|| slot);
        trace!(node = %self.node, slot, head_slot = state.head.slot, "observed state delivered");
        *self.latest.write() = Some(state);
    }
}

impl Worker for ObservedStateMailbox {
    fn poll(&self, _now_millis: u64) -> bool {
        let mut rx = self.rx.lock();
        let mut delivered = false;
        loop {
            match rx.try_recv() {
                Ok(state) => {
                    self.deliver(state);
                    delivered = true;
                }
                Err(TryRecvError::Lagged(n)) => {
                    if self.first_slot.get().is_none() {
                        self.missed_before_first.fetch_add(n, Ordering::AcqRel);
                    }
                    warn!(node = %self.node, skipped = n, "observed state stream lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        delivered
    }
}
