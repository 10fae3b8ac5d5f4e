//! Block lookup overlaying the node's storage.
use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::trace;

use beacon_sim_core::types::{BeaconBlock, Hash256, Slot};

use crate::error::HarnessError;
use crate::storage_view::ChainStorageView;

/// Root → block map consulted before the backing storage.
///
/// [`put`](Self::put) only touches the local map; nothing is written to
/// storage.
pub struct BlockCache {
    blocks: RwLock<HashMap<Hash256, BeaconBlock>>,
    storage: ChainStorageView,
}

impl BlockCache {
    pub fn new(storage: ChainStorageView) -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
            storage,
        }
    }

    pub fn put(&self, root: Hash256, block: BeaconBlock) {
        self.blocks.write().insert(root, block);
    }

    /// Local entry, else the stored block's message, else `None`.
    pub fn get(&self, root: &Hash256) -> Result<Option<BeaconBlock>, HarnessError> {
        if let Some(block) = self.blocks.read().get(root) {
            return Ok(Some(block.clone()));
        }
        Ok(self.storage.block(root)?.map(|signed| signed.into_message()))
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    pub fn storage(&self) -> &ChainStorageView {
        &self.storage
    }

    /// Root of the block at `slot` on the chain ending at `root`.
    ///
    /// Walks parent links while the block is above `slot`. Returns `root`
    /// itself when it sits exactly at `slot` and [`Hash256::ZERO`] when the
    /// walk steps past `slot`, i.e. nothing was proposed there. Fails with
    /// [`HarnessError::UnknownBlock`] on a root that cannot be resolved, and
    /// on a parent whose slot is not below its child's, which also bounds
    /// the walk on malformed storage.
    pub fn ancestor_at_slot(&self, root: Hash256, slot: Slot) -> Result<Hash256, HarnessError> {
        let mut current = root;
        let mut ceiling: Option<Slot> = None;
        loop {
            let block = self.get(&current)?.ok_or(HarnessError::UnknownBlock(current))?;
            if ceiling.is_some_and(|child| block.slot >= child) {
                return Err(HarnessError::UnknownBlock(current));
            }
            if block.slot == slot {
                return Ok(current);
            }
            if block.slot < slot {
                trace!(%root, slot, found = block.slot, "no block at slot");
                return Ok(Hash256::ZERO);
            }
            ceiling = Some(block.slot);
            current = block.parent_root;
        }
    }
}
