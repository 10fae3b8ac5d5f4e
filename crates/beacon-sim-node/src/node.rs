//! Reference beacon node and its launcher.
//!
//! The [`BeaconNode`] owns no threads. It registers itself as a [`Worker`] on
//! the injected scheduler and does all of its work inside `poll`: draining
//! the wire, applying blocks and attestations, advancing its latest slot
//! state, and publishing an [`ObservedState`] whenever something changed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, trace, warn};

use beacon_sim_core::constants::{DomainType, GENESIS_EPOCH};
use beacon_sim_core::error::NodeError;
use beacon_sim_core::traits::{
    ChainNode, ChainSpec, ChainStorage, ForkChoiceStore, NodeContext, NodeLauncher, TimeSource,
    Worker,
};
use beacon_sim_core::types::{
    Attestation, BeaconBlock, BeaconState, BeaconTuple, Hash256, ObservedState, SignedBeaconBlock,
    Signature, Slot,
};

use crate::config::NodeConfig;
use crate::store::InMemoryStore;

/// Mutable chain view guarded by one lock.
struct ChainView {
    /// Post-state of every accepted block, by block root.
    post_states: HashMap<Hash256, BeaconState>,
    head_root: Hash256,
    head: BeaconBlock,
    /// Head state advanced through empty slots to the current slot.
    latest_slot_state: BeaconState,
    /// Head the latest slot state was derived from.
    latest_base: Hash256,
    pending: Vec<Attestation>,
    published: bool,
}

/// The reference node.
pub struct BeaconNode {
    name: String,
    spec: Arc<dyn ChainSpec>,
    config: NodeConfig,
    time: Arc<dyn TimeSource>,
    genesis_time_millis: u64,
    store: Arc<InMemoryStore>,
    storage: Option<Arc<dyn ChainStorage>>,
    inbound_blocks: Mutex<broadcast::Receiver<SignedBeaconBlock>>,
    inbound_attestations: Mutex<broadcast::Receiver<Attestation>>,
    observed_tx: broadcast::Sender<ObservedState>,
    chain: Mutex<ChainView>,
}

impl BeaconNode {
    /// Build the node from its context and register its worker.
    ///
    /// Computes the genesis state from the chain-start parameters; the node
    /// stays idle until the time source reaches genesis time.
    pub fn launch(context: NodeContext, config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        let NodeContext {
            name,
            spec,
            chain_start,
            scheduler,
            wire,
            storage,
        } = context;

        let genesis_state = spec.genesis_state(&chain_start)?;
        let genesis_block = spec.genesis_block(&genesis_state);
        let genesis_root = spec.block_root(&genesis_block);

        let store = Arc::new(InMemoryStore::anchored(genesis_root, genesis_block.clone()));
        if let Some(storage) = &storage {
            let signed = SignedBeaconBlock {
                message: genesis_block.clone(),
                signature: Signature::ZERO,
            };
            let persisted = storage
                .put_block(genesis_root, signed.clone())
                .and_then(|_| storage.put_state(genesis_block.state_root, genesis_state.clone()))
                .and_then(|_| storage.put_tuple(genesis_root, BeaconTuple::new(signed, genesis_state.clone())))
                .and_then(|_| storage.commit());
            if let Err(e) = persisted {
                return Err(NodeError::Launch(format!("persisting genesis: {e}")));
            }
        }

        let (observed_tx, _) = broadcast::channel(config.observed_capacity.max(1));
        let chain = ChainView {
            post_states: HashMap::from([(genesis_root, genesis_state.clone())]),
            head_root: genesis_root,
            head: genesis_block,
            latest_slot_state: genesis_state,
            latest_base: genesis_root,
            pending: Vec::new(),
            published: false,
        };

        let node = Arc::new(Self {
            spec,
            config,
            time: scheduler.time_source(),
            genesis_time_millis: chain_start.genesis_time_millis(),
            store,
            storage,
            inbound_blocks: Mutex::new(wire.inbound_blocks()),
            inbound_attestations: Mutex::new(wire.inbound_attestations()),
            observed_tx,
            chain: Mutex::new(chain),
            name,
        });
        scheduler.spawn_worker(&node.name, Arc::clone(&node) as Arc<dyn Worker>);

        info!(node = %node.name, %genesis_root, "beacon node launched");
        Ok(node)
    }

    /// Root of the current head block.
    pub fn head_root(&self) -> Hash256 {
        self.chain.lock().head_root
    }

    /// Current wall time as seen through the injected time source.
    pub fn now_millis(&self) -> u64 {
        self.time.now_millis()
    }

    fn drain<T: Clone>(&self, rx: &Mutex<broadcast::Receiver<T>>, kind: &'static str) -> Vec<T> {
        let mut rx = rx.lock();
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(item) => out.push(item),
                Err(TryRecvError::Lagged(n)) => {
                    warn!(node = %self.name, skipped = n, kind, "lagged behind on inbound messages");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        out
    }

    fn on_block(&self, chain: &mut ChainView, block: SignedBeaconBlock, now_millis: u64) -> bool {
        let message = &block.message;
        let root = self.spec.block_root(message);
        if chain.post_states.contains_key(&root) {
            trace!(node = %self.name, %root, "duplicate block");
            return false;
        }
        let current_slot = self.spec.current_slot(Some(&chain.latest_slot_state), now_millis);
        if message.slot > current_slot {
            debug!(node = %self.name, slot = message.slot, current_slot, "rejected block from the future");
            return false;
        }
        let Some(parent_state) = chain.post_states.get(&message.parent_root) else {
            debug!(node = %self.name, slot = message.slot, parent = %message.parent_root, "rejected block with unknown parent");
            return false;
        };
        let post = match self.spec.state_transition(parent_state, &block, true) {
            Ok(post) => post,
            Err(e) => {
                debug!(node = %self.name, slot = message.slot, %root, "rejected block: {e}");
                return false;
            }
        };

        self.store.insert_block(root, message.clone());
        self.persist(root, &block, &post);
        chain
            .pending
            .retain(|a| !message.body.attestations.contains(a));
        chain.post_states.insert(root, post);

        if message.slot > chain.head.slot {
            chain.head_root = root;
            chain.head = message.clone();
            if let Some(head_state) = chain.post_states.get(&root) {
                self.mirror_checkpoints(head_state);
            }
        }
        debug!(node = %self.name, slot = message.slot, %root, "accepted block");
        true
    }

    fn persist(&self, root: Hash256, block: &SignedBeaconBlock, post: &BeaconState) {
        let Some(storage) = self.storage.as_ref().filter(|_| self.config.persist_blocks) else {
            return;
        };
        let result = storage
            .put_block(root, block.clone())
            .and_then(|_| storage.put_state(block.message.state_root, post.clone()))
            .and_then(|_| storage.put_tuple(root, BeaconTuple::new(block.clone(), post.clone())))
            .and_then(|_| storage.commit());
        if let Err(e) = result {
            warn!(node = %self.name, %root, "failed to persist block: {e}");
        }
    }

    fn mirror_checkpoints(&self, state: &BeaconState) {
        let justified = state.current_justified_checkpoint;
        let finalized = state.finalized_checkpoint;
        if justified.epoch > GENESIS_EPOCH || finalized.epoch > GENESIS_EPOCH {
            self.store.advance_checkpoints(justified, finalized);
        }
    }

    /// Gossip checks against the latest slot state.
    fn validate_gossip_attestation(&self, state: &BeaconState, attestation: &Attestation) -> Result<(), String> {
        let data = &attestation.data;
        let slots_per_epoch = self.spec.config().slots_per_epoch;
        if data.slot > state.slot {
            return Err(format!("attestation slot {} is ahead of {}", data.slot, state.slot));
        }
        if data.slot + slots_per_epoch < state.slot {
            return Err(format!("attestation slot {} is too old at {}", data.slot, state.slot));
        }
        let committees = self
            .spec
            .committees_at_slot(state, data.slot)
            .map_err(|e| e.to_string())?;
        let committee = committees
            .iter()
            .find(|c| c.index == data.index)
            .ok_or_else(|| format!("unknown committee {}", data.index))?;
        if attestation.aggregation_bits.len() != committee.members.len() {
            return Err("aggregation bits do not match committee size".into());
        }
        let pubkeys = committee
            .members
            .iter()
            .zip(&attestation.aggregation_bits)
            .filter(|(_, bit)| **bit)
            .map(|(member, _)| state.validator_pubkey(*member))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        if pubkeys.is_empty() {
            return Err("no aggregation bits set".into());
        }
        if self.spec.config().verify_signatures {
            let domain = self.spec.domain(state, DomainType::BeaconAttester, data.target.epoch);
            let root = self.spec.attestation_data_root(data);
            if !self.spec.verify_signature(&pubkeys, root, domain, &attestation.signature) {
                return Err("invalid signature".into());
            }
        }
        Ok(())
    }

    fn on_attestation(&self, chain: &mut ChainView, attestation: Attestation) -> bool {
        if chain.pending.contains(&attestation) {
            return false;
        }
        if let Err(reason) = self.validate_gossip_attestation(&chain.latest_slot_state, &attestation) {
            debug!(node = %self.name, slot = attestation.data.slot, %reason, "rejected attestation");
            return false;
        }
        chain.pending.push(attestation);
        let limit = self.config.attestation_pool_limit.max(1);
        if chain.pending.len() > limit {
            let excess = chain.pending.len() - limit;
            chain.pending.drain(..excess);
        }
        true
    }

    /// Move the latest slot state to the current slot on top of the head.
    fn advance(&self, chain: &mut ChainView, now_millis: u64) -> bool {
        let current_slot: Slot = self.spec.current_slot(Some(&chain.latest_slot_state), now_millis);
        let target = current_slot.max(chain.head.slot);
        let same_base = chain.latest_base == chain.head_root;
        if same_base && chain.latest_slot_state.slot >= target {
            return false;
        }
        let base = if same_base {
            &chain.latest_slot_state
        } else {
            match chain.post_states.get(&chain.head_root) {
                Some(state) => state,
                None => return false,
            }
        };
        match self.spec.process_slots(base, target) {
            Ok(state) => {
                chain.latest_slot_state = state;
                chain.latest_base = chain.head_root;
                let horizon = self.spec.config().slots_per_epoch;
                chain.pending.retain(|a| a.data.slot + horizon >= target);
                true
            }
            Err(e) => {
                warn!(node = %self.name, target, "failed to advance latest slot state: {e}");
                false
            }
        }
    }

    fn publish(&self, chain: &ChainView) {
        let observed = ObservedState {
            head: chain.head.clone(),
            latest_slot_state: chain.latest_slot_state.clone(),
            pending_attestations: chain.pending.clone(),
        };
        // No subscribers is not an error for the node.
        let _ = self.observed_tx.send(observed);
        trace!(
            node = %self.name,
            head_slot = chain.head.slot,
            slot = chain.latest_slot_state.slot,
            pending = chain.pending.len(),
            "published observed state"
        );
    }
}

impl Worker for BeaconNode {
    fn poll(&self, now_millis: u64) -> bool {
        if now_millis < self.genesis_time_millis {
            return false;
        }
        let blocks = self.drain(&self.inbound_blocks, "blocks");
        let attestations = self.drain(&self.inbound_attestations, "attestations");

        let mut chain = self.chain.lock();
        let mut changed = !chain.published;
        for block in blocks {
            changed |= self.on_block(&mut chain, block, now_millis);
        }
        changed |= self.advance(&mut chain, now_millis);
        for attestation in attestations {
            changed |= self.on_attestation(&mut chain, attestation);
        }
        if changed {
            self.publish(&chain);
            chain.published = true;
        }
        changed
    }
}

impl ChainNode for BeaconNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn observed_states(&self) -> broadcast::Receiver<ObservedState> {
        self.observed_tx.subscribe()
    }

    fn fork_choice_store(&self) -> Arc<dyn ForkChoiceStore> {
        Arc::clone(&self.store) as Arc<dyn ForkChoiceStore>
    }

    fn chain_storage(&self) -> Option<Arc<dyn ChainStorage>> {
        self.storage.clone()
    }
}

/// Launches [`BeaconNode`]s with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct BeaconNodeLauncher {
    config: NodeConfig,
}

impl BeaconNodeLauncher {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }
}

impl NodeLauncher for BeaconNodeLauncher {
    fn launch(&self, context: NodeContext) -> Result<Arc<dyn ChainNode>, NodeError> {
        let node = BeaconNode::launch(context, self.config.clone())?;
        Ok(node as Arc<dyn ChainNode>)
    }
}
