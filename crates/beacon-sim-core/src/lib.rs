//! # beacon-sim-core
//! Protocol types and collaborator traits shared by the beacon-sim harness,
//! the reference spec, and the reference node.

pub mod chain_storage;
pub mod codec;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod genesis;
pub mod traits;
pub mod types;
