//! Storage as the harness sees it.
//!
//! A node launched with chain storage exposes it in full. A node without
//! one only has its live fork-choice view, so the harness gets a reduced
//! capability set over that view: checkpoint get/set/clear and keyed block
//! lookup. Everything else is reached through [`ChainStorageView::full`]
//! and fails with [`HarnessError::NotImplemented`] on the reduced view.
use std::sync::Arc;

use beacon_sim_core::traits::{ChainStorage, ForkChoiceStore};
use beacon_sim_core::types::{BeaconBlock, BeaconTuple, Checkpoint, Hash256, Signed, Slot};

use crate::error::HarnessError;

/// Reduced storage backed by a node's in-memory fork-choice fields.
#[derive(Clone)]
pub struct MinimalStorage {
    store: Arc<dyn ForkChoiceStore>,
}

impl MinimalStorage {
    pub fn new(store: Arc<dyn ForkChoiceStore>) -> Self {
        Self { store }
    }

    pub fn justified_checkpoint(&self) -> Option<Checkpoint> {
        self.store.justified_checkpoint()
    }

    pub fn set_justified_checkpoint(&self, checkpoint: Checkpoint) {
        self.store.set_justified_checkpoint(Some(checkpoint));
    }

    pub fn clear_justified_checkpoint(&self) {
        self.store.set_justified_checkpoint(None);
    }

    pub fn finalized_checkpoint(&self) -> Option<Checkpoint> {
        self.store.finalized_checkpoint()
    }

    pub fn set_finalized_checkpoint(&self, checkpoint: Checkpoint) {
        self.store.set_finalized_checkpoint(Some(checkpoint));
    }

    pub fn clear_finalized_checkpoint(&self) {
        self.store.set_finalized_checkpoint(None);
    }

    /// The node keeps bare messages only, so the signature is never known.
    pub fn block(&self, root: &Hash256) -> Option<Signed<BeaconBlock>> {
        self.store.block(root).map(Signed::SignatureUnavailable)
    }
}

#[derive(Clone)]
pub enum ChainStorageView {
    Full(Arc<dyn ChainStorage>),
    Minimal(MinimalStorage),
}

impl ChainStorageView {
    /// Prefer the node's real storage; fall back to its fork-choice store.
    pub fn new(storage: Option<Arc<dyn ChainStorage>>, store: Arc<dyn ForkChoiceStore>) -> Self {
        match storage {
            Some(storage) => Self::Full(storage),
            None => Self::Minimal(MinimalStorage::new(store)),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Full storage, or `NotImplemented(op)` on the reduced view.
    pub fn full(&self, op: &'static str) -> Result<&Arc<dyn ChainStorage>, HarnessError> {
        match self {
            Self::Full(storage) => Ok(storage),
            Self::Minimal(_) => Err(HarnessError::NotImplemented(op)),
        }
    }

    // --- checkpoints ---

    pub fn justified_checkpoint(&self) -> Result<Option<Checkpoint>, HarnessError> {
        match self {
            Self::Full(storage) => Ok(storage.justified_checkpoint()?),
            Self::Minimal(minimal) => Ok(minimal.justified_checkpoint()),
        }
    }

    /// Full storage stages the write until [`commit`](Self::commit).
    pub fn set_justified_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), HarnessError> {
        match self {
            Self::Full(storage) => Ok(storage.set_justified_checkpoint(Some(checkpoint))?),
            Self::Minimal(minimal) => {
                minimal.set_justified_checkpoint(checkpoint);
                Ok(())
            }
        }
    }

    pub fn clear_justified_checkpoint(&self) -> Result<(), HarnessError> {
        match self {
            Self::Full(storage) => Ok(storage.set_justified_checkpoint(None)?),
            Self::Minimal(minimal) => {
                minimal.clear_justified_checkpoint();
                Ok(())
            }
        }
    }

    pub fn finalized_checkpoint(&self) -> Result<Option<Checkpoint>, HarnessError> {
        match self {
            Self::Full(storage) => Ok(storage.finalized_checkpoint()?),
            Self::Minimal(minimal) => Ok(minimal.finalized_checkpoint()),
        }
    }

    pub fn set_finalized_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), HarnessError> {
        match self {
            Self::Full(storage) => Ok(storage.set_finalized_checkpoint(Some(checkpoint))?),
            Self::Minimal(minimal) => {
                minimal.set_finalized_checkpoint(checkpoint);
                Ok(())
            }
        }
    }

    pub fn clear_finalized_checkpoint(&self) -> Result<(), HarnessError> {
        match self {
            Self::Full(storage) => Ok(storage.set_finalized_checkpoint(None)?),
            Self::Minimal(minimal) => {
                minimal.clear_finalized_checkpoint();
                Ok(())
            }
        }
    }

    // --- blocks ---

    pub fn block(&self, root: &Hash256) -> Result<Option<Signed<BeaconBlock>>, HarnessError> {
        match self {
            Self::Full(storage) => Ok(storage.block(root)?.map(Signed::from)),
            Self::Minimal(minimal) => Ok(minimal.block(root)),
        }
    }

    // --- full storage only ---

    pub fn slot_blocks(&self, slot: Slot) -> Result<Vec<Hash256>, HarnessError> {
        Ok(self.full("slot_blocks")?.slot_blocks(slot)?)
    }

    pub fn max_slot(&self) -> Result<Option<Slot>, HarnessError> {
        Ok(self.full("max_slot")?.max_slot()?)
    }

    pub fn tuple(&self, root: &Hash256) -> Result<Option<BeaconTuple>, HarnessError> {
        Ok(self.full("tuple")?.tuple(root)?)
    }

    pub fn put_tuple(&self, root: Hash256, tuple: BeaconTuple) -> Result<(), HarnessError> {
        Ok(self.full("put_tuple")?.put_tuple(root, tuple)?)
    }

    pub fn best_justified_checkpoint(&self) -> Result<Option<Checkpoint>, HarnessError> {
        Ok(self.full("best_justified_checkpoint")?.best_justified_checkpoint()?)
    }

    pub fn set_best_justified_checkpoint(&self, checkpoint: Option<Checkpoint>) -> Result<(), HarnessError> {
        Ok(self
            .full("set_best_justified_checkpoint")?
            .set_best_justified_checkpoint(checkpoint)?)
    }

    pub fn commit(&self) -> Result<(), HarnessError> {
        Ok(self.full("commit")?.commit()?)
    }
}
