//! Protocol constants and the minimal preset.
//!
//! The preset mirrors the "minimal" configuration used by beacon chain test
//! suites: short epochs and small committees so that scenarios with a handful
//! of interop validators still exercise every committee path.

use serde::{Deserialize, Serialize};

use crate::types::{Domain, Epoch, Gwei, Slot};

pub const GENESIS_SLOT: Slot = 0;
pub const GENESIS_EPOCH: Epoch = 0;
pub const FAR_FUTURE_EPOCH: Epoch = u64::MAX;

/// Stake carried by every interop deposit (32 ETH in Gwei).
pub const MAX_EFFECTIVE_BALANCE: Gwei = 32_000_000_000;

/// Four-byte fork version baked into every signing domain at genesis.
pub const GENESIS_FORK_VERSION: u32 = 0x0000_0001;

/// Signing domain separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainType {
    BeaconProposer,
    BeaconAttester,
    Randao,
    Deposit,
    VoluntaryExit,
}

impl DomainType {
    /// Numeric domain type as defined by the protocol.
    pub fn id(self) -> u32 {
        match self {
            Self::BeaconProposer => 0,
            Self::BeaconAttester => 1,
            Self::Randao => 2,
            Self::Deposit => 3,
            Self::VoluntaryExit => 4,
        }
    }
}

/// Combine a domain type with a fork version into a 64-bit signing domain.
///
/// # Examples
///
/// ```
/// use beacon_sim_core::constants::{compute_domain, DomainType};
/// assert_eq!(compute_domain(DomainType::Randao, 1), (1u64 << 32) | 2);
/// ```
pub fn compute_domain(domain_type: DomainType, fork_version: u32) -> Domain {
    (u64::from(fork_version) << 32) | u64::from(domain_type.id())
}

/// Tunable protocol parameters consumed by a [`ChainSpec`](crate::traits::ChainSpec).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecConfig {
    pub slots_per_epoch: u64,
    pub seconds_per_slot: u64,
    pub target_committee_size: u64,
    pub max_committees_per_slot: u64,
    pub max_attestations: usize,
    pub slots_per_historical_root: u64,
    pub epochs_per_historical_vector: u64,
    pub min_attestation_inclusion_delay: u64,
    pub min_seed_lookahead: u64,
    pub max_seed_lookahead: u64,
    pub genesis_fork_version: u32,
    /// Verify proposer, RANDAO and attestation signatures during transitions.
    pub verify_signatures: bool,
    /// Verify genesis deposit proofs of possession with real Ed25519 keys.
    pub verify_proof_of_possession: bool,
}

impl Default for SpecConfig {
    fn default() -> Self {
        Self::minimal()
    }
}

impl SpecConfig {
    /// The minimal preset.
    pub fn minimal() -> Self {
        Self {
            slots_per_epoch: 8,
            seconds_per_slot: 6,
            target_committee_size: 4,
            max_committees_per_slot: 4,
            max_attestations: 128,
            slots_per_historical_root: 64,
            epochs_per_historical_vector: 64,
            min_attestation_inclusion_delay: 1,
            min_seed_lookahead: 1,
            max_seed_lookahead: 4,
            genesis_fork_version: GENESIS_FORK_VERSION,
            verify_signatures: true,
            verify_proof_of_possession: false,
        }
    }

    /// Slot duration in milliseconds.
    pub fn slot_duration_millis(&self) -> u64 {
        self.seconds_per_slot * 1_000
    }
}
