//! # beacon-sim-node: Reference beacon node.
//!
//! A node that runs entirely on harness-provided collaborators:
//! - [`node::BeaconNode`]: block and attestation intake, head tracking, observed-state publishing
//! - [`node::BeaconNodeLauncher`]: [`NodeLauncher`](beacon_sim_core::traits::NodeLauncher) implementation
//! - [`store::InMemoryStore`]: the node's live fork-choice store
//! - [`config::NodeConfig`]: node configuration

pub mod config;
pub mod node;
pub mod store;

pub use config::NodeConfig;
pub use node::{BeaconNode, BeaconNodeLauncher};
pub use store::InMemoryStore;
