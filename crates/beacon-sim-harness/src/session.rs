//! One simulated node and the virtual environment around it.
use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use beacon_sim_core::chain_storage::MemoryChainStorage;
use beacon_sim_core::crypto::{KeyPairSignerFactory, PseudoSignerFactory};
use beacon_sim_core::genesis::ChainStart;
use beacon_sim_core::traits::{
    ChainNode, ChainSpec, ChainStorage, NodeContext, NodeLauncher, Scheduler, SignerFactory,
    WireApi,
};
use beacon_sim_core::types::{BeaconBlock, BeaconState, Epoch, Hash256, ObservedState, Slot};

use crate::block_cache::BlockCache;
use crate::clock::VirtualClock;
use crate::config::SessionParams;
use crate::error::HarnessError;
use crate::mailbox::ObservedStateMailbox;
use crate::scheduler::ControlledScheduler;
use crate::storage_view::ChainStorageView;
use crate::trace::{EventTrace, TestEvent};
use crate::transport::TransportStub;

/// How far before genesis the clock starts.
pub const GENESIS_PRIME_MILLIS: u64 = 1_000;

/// A node under test together with its clock, scheduler, transport and
/// event trace.
///
/// Construction launches the node, lets it reach genesis and captures the
/// genesis state. Afterwards time only moves through
/// [`set_current_slot`](Self::set_current_slot).
pub struct NodeSession {
    params: SessionParams,
    spec: Arc<dyn ChainSpec>,
    chain_start: ChainStart,
    clock: Arc<VirtualClock>,
    scheduler: Arc<ControlledScheduler>,
    transport: Arc<TransportStub>,
    node: Arc<dyn ChainNode>,
    mailbox: Arc<ObservedStateMailbox>,
    block_cache: BlockCache,
    events: EventTrace,
    genesis_state: OnceLock<BeaconState>,
}

impl NodeSession {
    pub fn create(
        params: SessionParams,
        spec: Arc<dyn ChainSpec>,
        launcher: &dyn NodeLauncher,
    ) -> Result<Self, HarnessError> {
        params.validate()?;

        let signer_factory: Box<dyn SignerFactory> = if spec.config().verify_proof_of_possession {
            Box::new(KeyPairSignerFactory)
        } else {
            Box::new(PseudoSignerFactory)
        };
        let chain_start = ChainStart::interop(
            params.genesis_unix(),
            params.validator_count,
            spec.config().genesis_fork_version,
            signer_factory.as_ref(),
        );
        let genesis_millis = chain_start.genesis_time_millis();

        let clock = Arc::new(VirtualClock::new(genesis_millis.saturating_sub(GENESIS_PRIME_MILLIS)));
        let scheduler = Arc::new(ControlledScheduler::new(params.name.clone(), Arc::clone(&clock)));
        let transport = Arc::new(TransportStub::new());
        let storage = params
            .chain_storage
            .then(|| Arc::new(MemoryChainStorage::new()) as Arc<dyn ChainStorage>);

        let node = launcher.launch(NodeContext {
            name: params.name.clone(),
            spec: Arc::clone(&spec),
            chain_start: chain_start.clone(),
            scheduler: Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            wire: Arc::clone(&transport) as Arc<dyn WireApi>,
            storage,
        })?;
        let mailbox = ObservedStateMailbox::attach(node.as_ref(), scheduler.as_ref());

        clock.advance_to(genesis_millis)?;
        scheduler.drain();

        let observed = mailbox
            .latest()
            .ok_or_else(|| HarnessError::Genesis("node published no state at genesis".into()))?;
        let missed = mailbox.missed_before_first();
        if missed > 0 {
            return Err(HarnessError::Genesis(format!(
                "{missed} observed states dropped before the first delivery"
            )));
        }
        match mailbox.first_slot() {
            Some(0) => {}
            Some(slot) => {
                return Err(HarnessError::Genesis(format!(
                    "first observed state is at slot {slot}, expected 0"
                )));
            }
            None => return Err(HarnessError::Genesis("no genesis state".into())),
        }

        let storage_view = ChainStorageView::new(node.chain_storage(), node.fork_choice_store());
        let session = Self {
            block_cache: BlockCache::new(storage_view),
            genesis_state: OnceLock::new(),
            events: EventTrace::new(),
            params,
            spec,
            chain_start,
            clock,
            scheduler,
            transport,
            node,
            mailbox,
        };
        let _ = session.genesis_state.set(observed.latest_slot_state);
        session.clock.seal();

        info!(
            node = %session.params.name,
            validators = session.params.validator_count,
            genesis_time = %session.params.genesis_time,
            chain_storage = session.params.chain_storage,
            "session created"
        );
        Ok(session)
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn spec(&self) -> &Arc<dyn ChainSpec> {
        &self.spec
    }

    pub fn chain_start(&self) -> &ChainStart {
        &self.chain_start
    }

    pub fn node(&self) -> &Arc<dyn ChainNode> {
        &self.node
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn scheduler(&self) -> &ControlledScheduler {
        &self.scheduler
    }

    pub fn transport(&self) -> &TransportStub {
        &self.transport
    }

    pub fn block_cache(&self) -> &BlockCache {
        &self.block_cache
    }

    pub fn storage(&self) -> &ChainStorageView {
        self.block_cache.storage()
    }

    pub fn events(&self) -> &EventTrace {
        &self.events
    }

    /// Genesis state captured at construction.
    pub fn genesis_state(&self) -> Result<&BeaconState, HarnessError> {
        self.genesis_state.get().ok_or(HarnessError::NotInitialized)
    }

    /// Latest state the node published.
    pub fn observed(&self) -> Result<ObservedState, HarnessError> {
        self.mailbox.latest().ok_or(HarnessError::NoObservedState)
    }

    /// Run every worker until nothing is left to do at the current time.
    pub fn settle(&self) {
        let rounds = self.scheduler.drain();
        debug!(node = %self.params.name, rounds, now = self.clock.now(), "settled");
    }

    pub fn current_slot(&self) -> Slot {
        let observed = self.mailbox.latest();
        self.spec
            .current_slot(observed.as_ref().map(|o| &o.latest_slot_state), self.clock.now())
    }

    pub fn current_epoch(&self) -> Epoch {
        self.spec.epoch_at_slot(self.current_slot())
    }

    /// Move the clock to the start of `slot` and let the node catch up.
    pub fn set_current_slot(&self, slot: Slot) -> Result<(), HarnessError> {
        let start = match self.mailbox.latest() {
            Some(observed) => self.spec.slot_start_time(&observed.latest_slot_state, slot),
            None => self.spec.slot_start_time(self.genesis_state()?, slot),
        };
        self.clock.advance_to(start)?;
        self.record(|| Ok(TestEvent::Slot(slot)))?;
        self.settle();
        Ok(())
    }

    pub fn root(&self, block: &BeaconBlock) -> Hash256 {
        self.spec.block_root(block)
    }

    /// Append an event when recording is enabled. The event is only built
    /// when it will be kept.
    pub(crate) fn record(
        &self,
        event: impl FnOnce() -> Result<TestEvent, HarnessError>,
    ) -> Result<(), HarnessError> {
        if self.params.record_events {
            self.events.record(event()?);
        }
        Ok(())
    }
}
