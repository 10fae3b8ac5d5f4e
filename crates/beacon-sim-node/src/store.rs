//! The node's live fork-choice store.

use std::collections::HashMap;

use parking_lot::RwLock;

use beacon_sim_core::traits::ForkChoiceStore;
use beacon_sim_core::types::{BeaconBlock, Checkpoint, Hash256};

/// In-memory [`ForkChoiceStore`].
///
/// Blocks are kept as bare messages; signatures are not retained.
#[derive(Default)]
pub struct InMemoryStore {
    blocks: RwLock<HashMap<Hash256, BeaconBlock>>,
    justified: RwLock<Option<Checkpoint>>,
    finalized: RwLock<Option<Checkpoint>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with `anchor` as the only block and both checkpoints at it.
    pub fn anchored(root: Hash256, anchor: BeaconBlock) -> Self {
        let store = Self::new();
        store.insert_block(root, anchor);
        let checkpoint = Checkpoint { epoch: 0, root };
        store.set_justified_checkpoint(Some(checkpoint));
        store.set_finalized_checkpoint(Some(checkpoint));
        store
    }

    pub fn insert_block(&self, root: Hash256, block: BeaconBlock) {
        self.blocks.write().insert(root, block);
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Adopt `justified` and `finalized` if they are newer than what is held.
    ///
    /// An empty slot counts as older than any checkpoint.
    pub fn advance_checkpoints(&self, justified: Checkpoint, finalized: Checkpoint) {
        advance(&self.justified, justified);
        advance(&self.finalized, finalized);
    }
}

fn advance(slot: &RwLock<Option<Checkpoint>>, candidate: Checkpoint) {
    let mut current = slot.write();
    let newer = match *current {
        Some(held) => candidate.epoch > held.epoch,
        None => true,
    };
    if newer {
        *current = Some(candidate);
    }
}

impl ForkChoiceStore for InMemoryStore {
    fn justified_checkpoint(&self) -> Option<Checkpoint> {
        *self.justified.read()
    }

    fn set_justified_checkpoint(&self, checkpoint: Option<Checkpoint>) {
        *self.justified.write() = checkpoint;
    }

    fn finalized_checkpoint(&self) -> Option<Checkpoint> {
        *self.finalized.read()
    }

    fn set_finalized_checkpoint(&self, checkpoint: Option<Checkpoint>) {
        *self.finalized.write() = checkpoint;
    }

    fn block(&self, root: &Hash256) -> Option<BeaconBlock> {
        self.blocks.read().get(root).cloned()
    }
}
