//! In-memory [`ChainStorage`] with write batching.
//!
//! Values are kept bincode-encoded per column, the way a key-value backend
//! would hold them. Writes are staged and become visible only on
//! [`ChainStorage::commit`].

use std::collections::{BTreeMap, HashMap};

use parking_lot::{Mutex, RwLock};

use crate::codec;
use crate::error::StorageError;
use crate::traits::ChainStorage;
use crate::types::{
    BeaconBlock, BeaconState, BeaconTuple, Checkpoint, Hash256, SignedBeaconBlock, Signature,
    Signed, Slot,
};

const BLOCKS: &str = "blocks";
const STATES: &str = "states";
const TUPLES: &str = "tuples";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum CheckpointKey {
    Justified,
    Finalized,
    BestJustified,
}

/// Tuple layout on disk; the signature is optional because tuples built
/// from bare messages have none.
#[derive(bincode::Encode, bincode::Decode)]
struct StoredTuple {
    block: BeaconBlock,
    signature: Option<Signature>,
    state: BeaconState,
}

enum WriteOp {
    Block { root: Hash256, slot: Slot, bytes: Vec<u8> },
    State { root: Hash256, bytes: Vec<u8> },
    Tuple { root: Hash256, bytes: Vec<u8> },
    Checkpoint { key: CheckpointKey, value: Option<Checkpoint> },
}

#[derive(Default)]
struct Columns {
    blocks: HashMap<Hash256, Vec<u8>>,
    states: HashMap<Hash256, Vec<u8>>,
    tuples: HashMap<Hash256, Vec<u8>>,
    /// Slot → block roots, in insertion order.
    slot_index: BTreeMap<Slot, Vec<Hash256>>,
    checkpoints: HashMap<CheckpointKey, Checkpoint>,
}

impl Columns {
    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::Block { root, slot, bytes } => {
                if self.blocks.insert(root, bytes).is_none() {
                    self.slot_index.entry(slot).or_default().push(root);
                }
            }
            WriteOp::State { root, bytes } => {
                self.states.insert(root, bytes);
            }
            WriteOp::Tuple { root, bytes } => {
                self.tuples.insert(root, bytes);
            }
            WriteOp::Checkpoint { key, value: Some(cp) } => {
                self.checkpoints.insert(key, cp);
            }
            WriteOp::Checkpoint { key, value: None } => {
                self.checkpoints.remove(&key);
            }
        }
    }
}

/// In-memory chain storage for tests and harness sessions.
#[derive(Default)]
pub struct MemoryChainStorage {
    committed: RwLock<Columns>,
    batch: Mutex<Vec<WriteOp>>,
}

impl MemoryChainStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged writes not yet committed.
    pub fn pending_writes(&self) -> usize {
        self.batch.lock().len()
    }

    /// Drop staged writes.
    pub fn discard(&self) {
        self.batch.lock().clear();
    }

    pub fn block_count(&self) -> usize {
        self.committed.read().blocks.len()
    }

    fn stage(&self, op: WriteOp) {
        self.batch.lock().push(op);
    }

    fn read<T: bincode::Decode<()>>(
        &self,
        column: &'static str,
        select: impl FnOnce(&Columns) -> Option<Vec<u8>>,
    ) -> Result<Option<T>, StorageError> {
        let bytes = select(&self.committed.read());
        bytes
            .map(|b| codec::decode(&b).map_err(|source| StorageError::Codec { column, source }))
            .transpose()
    }

    fn encode<T: bincode::Encode>(column: &'static str, value: &T) -> Result<Vec<u8>, StorageError> {
        codec::encode(value).map_err(|source| StorageError::Codec { column, source })
    }

    fn checkpoint(&self, key: CheckpointKey) -> Option<Checkpoint> {
        self.committed.read().checkpoints.get(&key).copied()
    }
}

impl ChainStorage for MemoryChainStorage {
    fn block(&self, root: &Hash256) -> Result<Option<SignedBeaconBlock>, StorageError> {
        self.read(BLOCKS, |c| c.blocks.get(root).cloned())
    }

    fn put_block(&self, root: Hash256, block: SignedBeaconBlock) -> Result<(), StorageError> {
        let bytes = Self::encode(BLOCKS, &block)?;
        self.stage(WriteOp::Block {
            root,
            slot: block.message.slot,
            bytes,
        });
        Ok(())
    }

    fn state(&self, root: &Hash256) -> Result<Option<BeaconState>, StorageError> {
        self.read(STATES, |c| c.states.get(root).cloned())
    }

    fn put_state(&self, root: Hash256, state: BeaconState) -> Result<(), StorageError> {
        let bytes = Self::encode(STATES, &state)?;
        self.stage(WriteOp::State { root, bytes });
        Ok(())
    }

    fn slot_blocks(&self, slot: Slot) -> Result<Vec<Hash256>, StorageError> {
        Ok(self
            .committed
            .read()
            .slot_index
            .get(&slot)
            .cloned()
            .unwrap_or_default())
    }

    fn max_slot(&self) -> Result<Option<Slot>, StorageError> {
        Ok(self.committed.read().slot_index.keys().next_back().copied())
    }

    fn tuple(&self, root: &Hash256) -> Result<Option<BeaconTuple>, StorageError> {
        let stored: Option<StoredTuple> = self.read(TUPLES, |c| c.tuples.get(root).cloned())?;
        Ok(stored.map(|t| {
            let block = match t.signature {
                Some(signature) => Signed::Signed {
                    message: t.block,
                    signature,
                },
                None => Signed::SignatureUnavailable(t.block),
            };
            BeaconTuple {
                block,
                state: t.state,
            }
        }))
    }

    fn put_tuple(&self, root: Hash256, tuple: BeaconTuple) -> Result<(), StorageError> {
        let signature = tuple.block.signature().ok().copied();
        let stored = StoredTuple {
            block: tuple.block.into_message(),
            signature,
            state: tuple.state,
        };
        let bytes = Self::encode(TUPLES, &stored)?;
        self.stage(WriteOp::Tuple { root, bytes });
        Ok(())
    }

    fn justified_checkpoint(&self) -> Result<Option<Checkpoint>, StorageError> {
        Ok(self.checkpoint(CheckpointKey::Justified))
    }

    fn set_justified_checkpoint(&self, checkpoint: Option<Checkpoint>) -> Result<(), StorageError> {
        self.stage(WriteOp::Checkpoint {
            key: CheckpointKey::Justified,
            value: checkpoint,
        });
        Ok(())
    }

    fn finalized_checkpoint(&self) -> Result<Option<Checkpoint>, StorageError> {
        Ok(self.checkpoint(CheckpointKey::Finalized))
    }

    fn set_finalized_checkpoint(&self, checkpoint: Option<Checkpoint>) -> Result<(), StorageError> {
        self.stage(WriteOp::Checkpoint {
            key: CheckpointKey::Finalized,
            value: checkpoint,
        });
        Ok(())
    }

    fn best_justified_checkpoint(&self) -> Result<Option<Checkpoint>, StorageError> {
        Ok(self.checkpoint(CheckpointKey::BestJustified))
    }

    fn set_best_justified_checkpoint(
        &self,
        checkpoint: Option<Checkpoint>,
    ) -> Result<(), StorageError> {
        self.stage(WriteOp::Checkpoint {
            key: CheckpointKey::BestJustified,
            value: checkpoint,
        });
        Ok(())
    }

    fn commit(&self) -> Result<(), StorageError> {
        let ops = std::mem::take(&mut *self.batch.lock());
        let mut columns = self.committed.write();
        for op in ops {
            columns.apply(op);
        }
        Ok(())
    }
}
