//! Trait interfaces between the harness and the node under test.
//!
//! These traits define the contracts between crates:
//! - [`ChainSpec`]: protocol rules and state transitions (beacon-sim-consensus implements)
//! - [`Scheduler`], [`TimeSource`], [`Worker`]: cooperative execution driven by the harness
//! - [`WireApi`]: block and attestation transport (beacon-sim-harness implements)
//! - [`ForkChoiceStore`], [`ChainStorage`]: node-side persistence (beacon-sim-node implements)
//! - [`ChainNode`], [`NodeLauncher`]: the node service itself

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::constants::{DomainType, SpecConfig};
use crate::crypto::{self, KeyPair};
use crate::error::{NodeError, StorageError, TransitionError};
use crate::genesis::ChainStart;
use crate::types::{
    Attestation, AttestationData, BeaconBlock, BeaconBlockBody, BeaconState, BeaconTuple,
    Checkpoint, Committee, Domain, Epoch, Hash256, ObservedState, PublicKeyBytes,
    SignedBeaconBlock, Signature, Slot, ValidatorIndex,
};

/// Protocol rules of a beacon chain.
///
/// Implementations are pure: every method derives its answer from its
/// arguments, so the harness and the node can share one instance.
pub trait ChainSpec: Send + Sync {
    fn config(&self) -> &SpecConfig;

    /// Slot at wall time `now_millis`.
    ///
    /// Saturates at 0 before genesis and when no state is known yet.
    fn current_slot(&self, state: Option<&BeaconState>, now_millis: u64) -> Slot;

    /// Start of `slot` in Unix milliseconds.
    fn slot_start_time(&self, state: &BeaconState, slot: Slot) -> u64;

    fn epoch_at_slot(&self, slot: Slot) -> Epoch {
        slot / self.config().slots_per_epoch.max(1)
    }

    fn epoch_start_slot(&self, epoch: Epoch) -> Slot {
        epoch.saturating_mul(self.config().slots_per_epoch)
    }

    fn current_epoch(&self, state: &BeaconState) -> Epoch {
        self.epoch_at_slot(state.slot)
    }

    fn previous_epoch(&self, state: &BeaconState) -> Epoch {
        self.current_epoch(state).saturating_sub(1)
    }

    /// Proposer for `state.slot`.
    fn beacon_proposer_index(&self, state: &BeaconState) -> Result<ValidatorIndex, TransitionError>;

    /// Committees assigned to `slot`, ordered by committee index.
    fn committees_at_slot(
        &self,
        state: &BeaconState,
        slot: Slot,
    ) -> Result<Vec<Committee>, TransitionError>;

    fn domain(&self, state: &BeaconState, domain_type: DomainType, epoch: Epoch) -> Domain;

    fn block_root(&self, block: &BeaconBlock) -> Hash256;

    fn state_root(&self, state: &BeaconState) -> Hash256;

    fn attestation_data_root(&self, data: &AttestationData) -> Hash256;

    /// Signing root of an epoch number, signed by RANDAO reveals.
    fn epoch_root(&self, epoch: Epoch) -> Hash256;

    /// Advance `state` through empty slots up to `slot`.
    ///
    /// Returns the state unchanged when `slot == state.slot` and fails with
    /// [`TransitionError::SlotInPast`] when `slot < state.slot`.
    fn process_slots(&self, state: &BeaconState, slot: Slot) -> Result<BeaconState, TransitionError>;

    /// Advance to the block's slot and apply it.
    ///
    /// With `validate_result` set the proposer signature and the block's
    /// claimed state root are checked as well.
    fn state_transition(
        &self,
        state: &BeaconState,
        block: &SignedBeaconBlock,
        validate_result: bool,
    ) -> Result<BeaconState, TransitionError>;

    fn empty_block(&self) -> BeaconBlock {
        BeaconBlock::empty()
    }

    fn empty_body(&self) -> BeaconBlockBody {
        BeaconBlockBody::empty()
    }

    /// RANDAO reveal for `epoch`: the epoch root signed in the RANDAO domain.
    fn randao_reveal(
        &self,
        state: &BeaconState,
        epoch: Epoch,
        signer: &dyn MessageSigner,
    ) -> Signature {
        signer.sign(self.epoch_root(epoch), self.domain(state, DomainType::Randao, epoch))
    }

    /// Check an aggregate signature by `pubkeys` over `message`.
    ///
    /// Default implementation uses the XOR-aggregated pseudo scheme from
    /// [`crypto`](crate::crypto).
    fn verify_signature(
        &self,
        pubkeys: &[PublicKeyBytes],
        message: Hash256,
        domain: Domain,
        signature: &Signature,
    ) -> bool {
        crypto::pseudo_verify(pubkeys, message, domain, signature)
    }

    /// Initial state built from chain-start parameters.
    fn genesis_state(&self, chain_start: &ChainStart) -> Result<BeaconState, TransitionError>;

    /// Genesis block committing to `state`.
    fn genesis_block(&self, state: &BeaconState) -> BeaconBlock {
        self.empty_block().with_state_root(self.state_root(state))
    }
}

/// Something that signs `(message, domain)` pairs on behalf of one validator.
pub trait MessageSigner: Send + Sync {
    fn sign(&self, message: Hash256, domain: Domain) -> Signature;

    fn public_key(&self) -> PublicKeyBytes;
}

/// Builds signers for validator keys.
pub trait SignerFactory: Send + Sync {
    fn signer(&self, keypair: &KeyPair) -> Box<dyn MessageSigner>;
}

/// Current time in Unix milliseconds.
pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// A unit of cooperative work.
///
/// The scheduler calls [`poll`](Self::poll) repeatedly until every worker
/// reports that it made no progress.
pub trait Worker: Send + Sync {
    /// Do whatever is ready at `now_millis`. Returns `true` if anything changed.
    fn poll(&self, now_millis: u64) -> bool;
}

/// Where a node registers its workers and reads the time.
pub trait Scheduler: Send + Sync {
    fn time_source(&self) -> Arc<dyn TimeSource>;

    fn spawn_worker(&self, name: &str, worker: Arc<dyn Worker>);
}

/// Block and attestation transport as seen by a node.
pub trait WireApi: Send + Sync {
    /// Publish a block produced by the node.
    fn send_proposed_block(&self, block: &SignedBeaconBlock);

    /// Publish an attestation produced by the node.
    fn send_attestation(&self, attestation: &Attestation);

    /// Subscribe to blocks arriving from peers.
    fn inbound_blocks(&self) -> broadcast::Receiver<SignedBeaconBlock>;

    /// Subscribe to attestations arriving from peers.
    fn inbound_attestations(&self) -> broadcast::Receiver<Attestation>;
}

/// Minimal fork-choice store every node exposes.
///
/// Setters take `&self`; implementations use interior mutability so the
/// store can be shared with the harness.
pub trait ForkChoiceStore: Send + Sync {
    fn justified_checkpoint(&self) -> Option<Checkpoint>;

    fn set_justified_checkpoint(&self, checkpoint: Option<Checkpoint>);

    fn finalized_checkpoint(&self) -> Option<Checkpoint>;

    fn set_finalized_checkpoint(&self, checkpoint: Option<Checkpoint>);

    /// Bare block message by root. Signatures are not retained.
    fn block(&self, root: &Hash256) -> Option<BeaconBlock>;
}

/// Full chain storage, available only on nodes configured with it.
///
/// Writes may be buffered until [`commit`](Self::commit).
pub trait ChainStorage: Send + Sync {
    fn block(&self, root: &Hash256) -> Result<Option<SignedBeaconBlock>, StorageError>;

    fn put_block(&self, root: Hash256, block: SignedBeaconBlock) -> Result<(), StorageError>;

    fn state(&self, root: &Hash256) -> Result<Option<BeaconState>, StorageError>;

    fn put_state(&self, root: Hash256, state: BeaconState) -> Result<(), StorageError>;

    /// Roots of all stored blocks at `slot`, in insertion order.
    fn slot_blocks(&self, slot: Slot) -> Result<Vec<Hash256>, StorageError>;

    /// Highest slot with a stored block.
    fn max_slot(&self) -> Result<Option<Slot>, StorageError>;

    fn tuple(&self, root: &Hash256) -> Result<Option<BeaconTuple>, StorageError>;

    fn put_tuple(&self, root: Hash256, tuple: BeaconTuple) -> Result<(), StorageError>;

    fn justified_checkpoint(&self) -> Result<Option<Checkpoint>, StorageError>;

    fn set_justified_checkpoint(&self, checkpoint: Option<Checkpoint>) -> Result<(), StorageError>;

    fn finalized_checkpoint(&self) -> Result<Option<Checkpoint>, StorageError>;

    fn set_finalized_checkpoint(&self, checkpoint: Option<Checkpoint>) -> Result<(), StorageError>;

    fn best_justified_checkpoint(&self) -> Result<Option<Checkpoint>, StorageError>;

    fn set_best_justified_checkpoint(
        &self,
        checkpoint: Option<Checkpoint>,
    ) -> Result<(), StorageError>;

    /// Make buffered writes durable.
    fn commit(&self) -> Result<(), StorageError>;
}

/// A running beacon node.
pub trait ChainNode: Send + Sync {
    fn name(&self) -> &str;

    /// Subscribe to the node's published observed states.
    fn observed_states(&self) -> broadcast::Receiver<ObservedState>;

    fn fork_choice_store(&self) -> Arc<dyn ForkChoiceStore>;

    /// Full storage, when the node was launched with one.
    fn chain_storage(&self) -> Option<Arc<dyn ChainStorage>>;
}

/// Everything a node needs from its environment.
#[derive(Clone)]
pub struct NodeContext {
    pub name: String,
    pub spec: Arc<dyn ChainSpec>,
    pub chain_start: ChainStart,
    pub scheduler: Arc<dyn Scheduler>,
    pub wire: Arc<dyn WireApi>,
    pub storage: Option<Arc<dyn ChainStorage>>,
}

/// Starts nodes inside a harness-provided environment.
pub trait NodeLauncher: Send + Sync {
    fn launch(&self, context: NodeContext) -> Result<Arc<dyn ChainNode>, NodeError>;
}
