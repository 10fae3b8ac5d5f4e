//! Deterministic cooperative scheduler injected into simulated nodes.
//!
//! Nodes register [`Worker`]s instead of spawning tasks. The harness calls
//! [`ControlledScheduler::drain`] after every action so that all pending work
//! at the current virtual time has run before control returns to the test.
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{trace, warn};

use beacon_sim_core::traits::{Scheduler, TimeSource, Worker};

use crate::clock::VirtualClock;

/// Upper bound on polling rounds per drain.
pub const DEFAULT_MAX_ROUNDS: usize = 1024;

pub struct ControlledScheduler {
    name: String,
    clock: Arc<VirtualClock>,
    workers: RwLock<Vec<(String, Arc<dyn Worker>)>>,
    max_rounds: usize,
}

impl ControlledScheduler {
    pub fn new(name: impl Into<String>, clock: Arc<VirtualClock>) -> Self {
        Self::with_max_rounds(name, clock, DEFAULT_MAX_ROUNDS)
    }

    pub fn with_max_rounds(name: impl Into<String>, clock: Arc<VirtualClock>, max_rounds: usize) -> Self {
        Self {
            name: name.into(),
            clock,
            workers: RwLock::new(Vec::new()),
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.workers.read().len()
    }

    /// Poll every worker, in registration order, until a full round makes
    /// no progress. Returns the number of rounds that made progress.
    pub fn drain(&self) -> usize {
        // Snapshot so a worker may register further workers while polled.
        let workers: Vec<(String, Arc<dyn Worker>)> = self.workers.read().clone();
        let now = self.clock.now();
        let mut rounds = 0;
        while rounds < self.max_rounds {
            let mut progressed = false;
            for (name, worker) in &workers {
                if worker.poll(now) {
                    trace!(scheduler = %self.name, worker = %name, now, "worker progressed");
                    progressed = true;
                }
            }
            if !progressed {
                return rounds;
            }
            rounds += 1;
        }
        warn!(scheduler = %self.name, rounds, now, "workers did not quiesce");
        rounds
    }
}

impl Scheduler for ControlledScheduler {
    fn time_source(&self) -> Arc<dyn TimeSource> {
        Arc::clone(&self.clock) as Arc<dyn TimeSource>
    }

    fn spawn_worker(&self, name: &str, worker: Arc<dyn Worker>) {
        trace!(scheduler = %self.name, worker = name, "worker registered");
        self.workers.write().push((name.to_string(), worker));
    }
}
