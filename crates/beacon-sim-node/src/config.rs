//! Node configuration for the reference beacon node.
//!
//! Provides [`NodeConfig`] with defaults sized for harness sessions. Values can
//! be set programmatically or deserialized from a session config file.

use serde::{Deserialize, Serialize};

/// Configuration for a reference node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Buffer size of the observed-state broadcast channel.
    pub observed_capacity: usize,
    /// Maximum gossip attestations held in the pending pool; oldest are dropped first.
    pub attestation_pool_limit: usize,
    /// Write accepted blocks and states through to chain storage when one is injected.
    pub persist_blocks: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            observed_capacity: 64,
            attestation_pool_limit: 4_096,
            persist_blocks: true,
        }
    }
}
