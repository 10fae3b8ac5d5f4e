//! Per-slot and end-of-epoch state processing.

use std::collections::BTreeSet;

use tracing::trace;

use beacon_sim_core::constants::GENESIS_EPOCH;
use beacon_sim_core::error::TransitionError;
use beacon_sim_core::traits::ChainSpec;
use beacon_sim_core::types::{
    tree_root, BeaconState, Checkpoint, Epoch, Gwei, Hash256, PendingAttestation, Slot,
    ValidatorIndex,
};

use crate::shuffling;
use crate::spec::MinimalSpec;

/// Cache the roots of the state and latest block for `state.slot`.
pub fn process_slot(spec: &MinimalSpec, state: &mut BeaconState) {
    let history = spec.config().slots_per_historical_root.max(1);
    let index = (state.slot % history) as usize;

    let previous_state_root = spec.state_root(state);
    if let Some(slot_root) = state.state_roots.get_mut(index) {
        *slot_root = previous_state_root;
    }
    if state.latest_block_header.state_root.is_zero() {
        state.latest_block_header.state_root = previous_state_root;
    }
    let previous_block_root = tree_root(&state.latest_block_header);
    if let Some(block_root) = state.block_roots.get_mut(index) {
        *block_root = previous_block_root;
    }
}

/// Block root recorded for `slot`; must be in the past and inside the
/// historical window.
pub fn block_root_at_slot(
    spec: &MinimalSpec,
    state: &BeaconState,
    slot: Slot,
) -> Result<Hash256, TransitionError> {
    let history = spec.config().slots_per_historical_root.max(1);
    if slot >= state.slot || state.slot > slot + history {
        return Err(TransitionError::BlockRootUnavailable(slot));
    }
    state
        .block_roots
        .get((slot % history) as usize)
        .copied()
        .ok_or(TransitionError::BlockRootUnavailable(slot))
}

pub fn block_root_at_epoch(
    spec: &MinimalSpec,
    state: &BeaconState,
    epoch: Epoch,
) -> Result<Hash256, TransitionError> {
    block_root_at_slot(spec, state, spec.epoch_start_slot(epoch))
}

/// Unslashed validators named by `attestations`.
pub fn attesting_indices(
    spec: &MinimalSpec,
    state: &BeaconState,
    attestations: &[PendingAttestation],
) -> Result<BTreeSet<ValidatorIndex>, TransitionError> {
    let mut indices = BTreeSet::new();
    for attestation in attestations {
        let committees = shuffling::committees_at_slot(spec.config(), state, attestation.data.slot)?;
        let Some(committee) = committees.iter().find(|c| c.index == attestation.data.index) else {
            continue;
        };
        indices.extend(
            committee
                .members
                .iter()
                .zip(&attestation.aggregation_bits)
                .filter(|(_, bit)| **bit)
                .map(|(member, _)| *member),
        );
    }
    indices.retain(|i| state.validator(*i).map(|v| !v.slashed).unwrap_or(false));
    Ok(indices)
}

fn target_balance(
    spec: &MinimalSpec,
    state: &BeaconState,
    attestations: &[PendingAttestation],
    epoch: Epoch,
) -> Result<Gwei, TransitionError> {
    let root = block_root_at_epoch(spec, state, epoch)?;
    let matching: Vec<PendingAttestation> = attestations
        .iter()
        .filter(|a| a.data.target.epoch == epoch && a.data.target.root == root)
        .cloned()
        .collect();
    if matching.is_empty() {
        return Ok(0);
    }
    let indices = attesting_indices(spec, state, &matching)?;
    Ok(state.total_balance(indices))
}

/// Justification and finalization from target-matching attestations.
pub fn process_justification_and_finalization(
    spec: &MinimalSpec,
    state: &mut BeaconState,
) -> Result<(), TransitionError> {
    let current = spec.current_epoch(state);
    if current <= GENESIS_EPOCH + 1 {
        return Ok(());
    }
    let previous = current - 1;
    let old_previous = state.previous_justified_checkpoint;
    let old_current = state.current_justified_checkpoint;

    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    state.justification_bits.copy_within(0..3, 1);
    state.justification_bits[0] = false;

    let total = state.total_balance(state.active_validator_indices(current));

    let previous_balance = target_balance(spec, state, &state.previous_epoch_attestations, previous)?;
    if previous_balance * 3 >= total * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: previous,
            root: block_root_at_epoch(spec, state, previous)?,
        };
        state.justification_bits[1] = true;
    }
    let current_balance = target_balance(spec, state, &state.current_epoch_attestations, current)?;
    if current_balance * 3 >= total * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: current,
            root: block_root_at_epoch(spec, state, current)?,
        };
        state.justification_bits[0] = true;
    }

    let bits = state.justification_bits;
    // 2nd/3rd/4th most recent epochs justified, 2nd using 4th as source.
    if bits[1..4].iter().all(|b| *b) && old_previous.epoch + 3 == current {
        state.finalized_checkpoint = old_previous;
    }
    // 2nd/3rd most recent justified, 2nd using 3rd as source.
    if bits[1..3].iter().all(|b| *b) && old_previous.epoch + 2 == current {
        state.finalized_checkpoint = old_previous;
    }
    // 1st/2nd/3rd most recent justified, 1st using 3rd as source.
    if bits[0..3].iter().all(|b| *b) && old_current.epoch + 2 == current {
        state.finalized_checkpoint = old_current;
    }
    // 1st/2nd most recent justified, 1st using 2nd as source.
    if bits[0..2].iter().all(|b| *b) && old_current.epoch + 1 == current {
        state.finalized_checkpoint = old_current;
    }
    Ok(())
}

/// Runs on the last slot of every epoch.
pub fn process_epoch(spec: &MinimalSpec, state: &mut BeaconState) -> Result<(), TransitionError> {
    process_justification_and_finalization(spec, state)?;

    let current = spec.current_epoch(state);
    let vector = spec.config().epochs_per_historical_vector.max(1);
    let mix = state
        .randao_mixes
        .get((current % vector) as usize)
        .copied()
        .unwrap_or(Hash256::ZERO);
    if let Some(next) = state.randao_mixes.get_mut(((current + 1) % vector) as usize) {
        *next = mix;
    }

    state.previous_epoch_attestations = std::mem::take(&mut state.current_epoch_attestations);

    trace!(
        epoch = current,
        justified = state.current_justified_checkpoint.epoch,
        finalized = state.finalized_checkpoint.epoch,
        "epoch processed"
    );
    Ok(())
}
