//! Scenario-level test suite for the beacon-sim harness.
//!
//! Integration tests wire the harness to the reference spec and node and
//! check the behaviour a scenario author relies on: block and attestation
//! construction, time control, storage views and golden traces.

pub mod helpers;
