//! In-process substitute for the gossip network.
use tokio::sync::broadcast;
use tracing::trace;

use beacon_sim_core::traits::WireApi;
use beacon_sim_core::types::{Attestation, SignedBeaconBlock};

/// Default buffer per channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Two independent broadcast channels, one for blocks and one for
/// attestations.
///
/// Publishing is fire-and-forget: it neither waits for nor reports on
/// delivery. Each channel preserves publish order; nothing is promised
/// about the order between the two. A publisher that outruns the slowest
/// subscriber by more than the capacity makes it lag; callers sending long
/// batches check [`attestation_backlog_full`](Self::attestation_backlog_full)
/// and let subscribers drain first.
pub struct TransportStub {
    capacity: usize,
    blocks: broadcast::Sender<SignedBeaconBlock>,
    attestations: broadcast::Sender<Attestation>,
}

impl TransportStub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (blocks, _) = broadcast::channel(capacity);
        let (attestations, _) = broadcast::channel(capacity);
        Self {
            capacity,
            blocks,
            attestations,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Another attestation publish would evict one not yet seen by every
    /// subscriber.
    pub fn attestation_backlog_full(&self) -> bool {
        self.attestations.len() >= self.capacity
    }

    /// Publish a block to every inbound-block subscriber.
    pub fn publish_block(&self, block: SignedBeaconBlock) {
        // Zero subscribers is fine; nobody is listening yet.
        let _ = self.blocks.send(block);
    }

    pub fn publish_attestation(&self, attestation: Attestation) {
        let _ = self.attestations.send(attestation);
    }
}

impl Default for TransportStub {
    fn default() -> Self {
        Self::new()
    }
}

impl WireApi for TransportStub {
    fn send_proposed_block(&self, block: &SignedBeaconBlock) {
        trace!(slot = block.message.slot, "dropping block proposed by node");
    }

    fn send_attestation(&self, attestation: &Attestation) {
        trace!(slot = attestation.data.slot, "dropping attestation produced by node");
    }

    fn inbound_blocks(&self) -> broadcast::Receiver<SignedBeaconBlock> {
        self.blocks.subscribe()
    }

    fn inbound_attestations(&self) -> broadcast::Receiver<Attestation> {
        self.attestations.subscribe()
    }
}
