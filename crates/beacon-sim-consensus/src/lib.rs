//! # beacon-sim-consensus: Reference beacon chain rules.
//!
//! This crate implements the [`ChainSpec`](beacon_sim_core::traits::ChainSpec)
//! trait with phase-0 style rules over the minimal preset: committee
//! shuffling, slot and epoch processing, block processing and genesis.
//!
//! Rewards, penalties and slashing processing are not modelled.

pub mod block_processing;
pub mod epoch_processing;
pub mod genesis;
pub mod shuffling;
pub mod spec;

pub use spec::MinimalSpec;
