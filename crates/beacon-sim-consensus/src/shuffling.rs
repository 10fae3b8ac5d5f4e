//! Seeds, proposer selection and committee assignment.
//!
//! Committees for an epoch are the active validators ordered by
//! `hash(seed || index)` and cut into `committees_per_slot * slots_per_epoch`
//! contiguous pieces. The seed for epoch `e` reads the RANDAO mix of epoch
//! `e - MIN_SEED_LOOKAHEAD - 1`, so assignments stay fixed while the current
//! epoch's mix is still being updated by block reveals.

use sha2::{Digest, Sha256};

use beacon_sim_core::constants::SpecConfig;
use beacon_sim_core::error::TransitionError;
use beacon_sim_core::types::{
    BeaconState, Committee, CommitteeIndex, Epoch, Hash256, Slot, ValidatorIndex,
};

/// SHA-256 over the concatenation of `parts`.
pub fn hash(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash256(hasher.finalize().into())
}

pub fn seed(config: &SpecConfig, state: &BeaconState, epoch: Epoch) -> Hash256 {
    let vector = config.epochs_per_historical_vector.max(1);
    let index = (epoch + vector - (config.min_seed_lookahead + 1) % vector) % vector;
    let mix = state
        .randao_mixes
        .get(index as usize)
        .copied()
        .unwrap_or(Hash256::ZERO);
    hash(&[mix.as_bytes(), &epoch.to_le_bytes()])
}

pub fn committees_per_slot(config: &SpecConfig, active_count: usize) -> u64 {
    let per_slot = active_count as u64
        / config.slots_per_epoch.max(1)
        / config.target_committee_size.max(1);
    per_slot.clamp(1, config.max_committees_per_slot.max(1))
}

/// Proposer for `state.slot`, uniformly chosen among active validators.
pub fn proposer_index(
    config: &SpecConfig,
    state: &BeaconState,
) -> Result<ValidatorIndex, TransitionError> {
    let epoch = state.slot / config.slots_per_epoch.max(1);
    let active = state.active_validator_indices(epoch);
    if active.is_empty() {
        return Err(TransitionError::NoActiveValidators(epoch));
    }
    let seed = seed(config, state, epoch);
    let pick = hash(&[seed.as_bytes(), &state.slot.to_le_bytes()]).low_u64();
    Ok(active[(pick % active.len() as u64) as usize])
}

/// Active validators of `epoch` in shuffled order.
pub fn shuffled_validators(config: &SpecConfig, state: &BeaconState, epoch: Epoch) -> Vec<ValidatorIndex> {
    let seed = seed(config, state, epoch);
    let mut keyed: Vec<(Hash256, ValidatorIndex)> = state
        .active_validator_indices(epoch)
        .into_iter()
        .map(|i| (hash(&[seed.as_bytes(), &i.to_le_bytes()]), i))
        .collect();
    keyed.sort_unstable();
    keyed.into_iter().map(|(_, i)| i).collect()
}

/// Committees attesting at `slot`, ordered by committee index.
pub fn committees_at_slot(
    config: &SpecConfig,
    state: &BeaconState,
    slot: Slot,
) -> Result<Vec<Committee>, TransitionError> {
    let slots_per_epoch = config.slots_per_epoch.max(1);
    let epoch = slot / slots_per_epoch;
    let shuffled = shuffled_validators(config, state, epoch);
    if shuffled.is_empty() {
        return Err(TransitionError::NoActiveValidators(epoch));
    }
    let per_slot = committees_per_slot(config, shuffled.len());
    let total = (per_slot * slots_per_epoch) as usize;
    let n = shuffled.len();
    let first = ((slot % slots_per_epoch) * per_slot) as usize;

    Ok((0..per_slot)
        .map(|index: CommitteeIndex| {
            let k = first + index as usize;
            let start = n * k / total;
            let end = n * (k + 1) / total;
            Committee {
                index,
                members: shuffled[start..end].to_vec(),
            }
        })
        .collect())
}
