//! Block processing: header, RANDAO, and operations.
//!
//! Checks run in protocol order and stop at the first failure. Signature
//! checks are skipped entirely when `verify_signatures` is off.

use beacon_sim_core::constants::DomainType;
use beacon_sim_core::error::TransitionError;
use beacon_sim_core::traits::ChainSpec;
use beacon_sim_core::types::{
    tree_root, Attestation, BeaconBlock, BeaconBlockHeader, BeaconState, Hash256,
    PendingAttestation, SignedVoluntaryExit, ValidatorIndex,
};

use crate::shuffling::{self, hash};
use crate::spec::MinimalSpec;

pub fn process_block(
    spec: &MinimalSpec,
    state: &mut BeaconState,
    block: &BeaconBlock,
) -> Result<(), TransitionError> {
    let proposer = process_block_header(spec, state, block)?;
    process_randao(spec, state, block, proposer)?;
    process_operations(spec, state, block, proposer)
}

/// Returns the proposer index for the block's slot.
pub fn process_block_header(
    spec: &MinimalSpec,
    state: &mut BeaconState,
    block: &BeaconBlock,
) -> Result<ValidatorIndex, TransitionError> {
    if block.slot != state.slot {
        return Err(TransitionError::SlotMismatch {
            block: block.slot,
            state: state.slot,
        });
    }
    if block.slot <= state.latest_block_header.slot {
        return Err(TransitionError::NotAfterParent {
            block: block.slot,
            parent: state.latest_block_header.slot,
        });
    }
    let parent = tree_root(&state.latest_block_header);
    if block.parent_root != parent {
        return Err(TransitionError::ParentRootMismatch {
            block: block.parent_root,
            state: parent,
        });
    }
    let proposer = spec.beacon_proposer_index(state)?;
    if state.validator(proposer)?.slashed {
        return Err(TransitionError::ProposerSlashed(proposer));
    }

    state.latest_block_header = BeaconBlockHeader {
        slot: block.slot,
        parent_root: block.parent_root,
        state_root: Hash256::ZERO,
        body_root: tree_root(&block.body),
    };
    Ok(proposer)
}

pub fn process_randao(
    spec: &MinimalSpec,
    state: &mut BeaconState,
    block: &BeaconBlock,
    proposer: ValidatorIndex,
) -> Result<(), TransitionError> {
    let epoch = spec.current_epoch(state);
    let reveal = &block.body.randao_reveal;
    if spec.config().verify_signatures {
        let pubkey = state.validator_pubkey(proposer)?;
        let domain = spec.domain(state, DomainType::Randao, epoch);
        if !spec.verify_signature(&[pubkey], spec.epoch_root(epoch), domain, reveal) {
            return Err(TransitionError::InvalidRandaoReveal);
        }
    }
    let vector = spec.config().epochs_per_historical_vector.max(1);
    if let Some(mix) = state.randao_mixes.get_mut((epoch % vector) as usize) {
        *mix = mix.xor(&hash(&[reveal.as_bytes()]));
    }
    Ok(())
}

pub fn process_operations(
    spec: &MinimalSpec,
    state: &mut BeaconState,
    block: &BeaconBlock,
    proposer: ValidatorIndex,
) -> Result<(), TransitionError> {
    let body = &block.body;
    if !body.proposer_slashings.is_empty() {
        return Err(TransitionError::Unsupported("proposer slashings"));
    }
    if !body.attester_slashings.is_empty() {
        return Err(TransitionError::Unsupported("attester slashings"));
    }
    let max = spec.config().max_attestations;
    if body.attestations.len() > max {
        return Err(TransitionError::TooManyAttestations {
            count: body.attestations.len(),
            max,
        });
    }
    for (index, attestation) in body.attestations.iter().enumerate() {
        process_attestation(spec, state, index, attestation, proposer)?;
    }
    if !body.deposits.is_empty() {
        return Err(TransitionError::Unsupported("deposits after genesis"));
    }
    for (index, exit) in body.voluntary_exits.iter().enumerate() {
        process_voluntary_exit(spec, state, index, exit)?;
    }
    Ok(())
}

/// Validators of `attestation`'s committee whose aggregation bit is set.
///
/// Shared by block processing and gossip validation.
pub fn validate_attestation(
    spec: &MinimalSpec,
    state: &BeaconState,
    attestation: &Attestation,
) -> Result<Vec<ValidatorIndex>, String> {
    let data = &attestation.data;
    let config = spec.config();
    let current = spec.current_epoch(state);
    let previous = spec.previous_epoch(state);

    if data.target.epoch != current && data.target.epoch != previous {
        return Err(format!(
            "target epoch {} is neither current {current} nor previous {previous}",
            data.target.epoch
        ));
    }
    if data.target.epoch != spec.epoch_at_slot(data.slot) {
        return Err(format!(
            "target epoch {} does not contain slot {}",
            data.target.epoch, data.slot
        ));
    }
    if data.slot + config.min_attestation_inclusion_delay > state.slot {
        return Err(format!("slot {} included too early at {}", data.slot, state.slot));
    }
    if state.slot > data.slot + config.slots_per_epoch {
        return Err(format!("slot {} included too late at {}", data.slot, state.slot));
    }
    let committees =
        shuffling::committees_at_slot(config, state, data.slot).map_err(|e| e.to_string())?;
    let committee = committees
        .iter()
        .find(|c| c.index == data.index)
        .ok_or_else(|| format!("committee index {} out of range", data.index))?;
    if attestation.aggregation_bits.len() != committee.members.len() {
        return Err(format!(
            "aggregation bits length {} does not match committee size {}",
            attestation.aggregation_bits.len(),
            committee.members.len()
        ));
    }
    let expected_source = if data.target.epoch == current {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    if data.source != expected_source {
        return Err(format!(
            "source epoch {} does not match justified epoch {}",
            data.source.epoch, expected_source.epoch
        ));
    }
    let attesters: Vec<ValidatorIndex> = committee
        .members
        .iter()
        .zip(&attestation.aggregation_bits)
        .filter(|(_, bit)| **bit)
        .map(|(member, _)| *member)
        .collect();
    if attesters.is_empty() {
        return Err("no aggregation bits set".into());
    }
    if config.verify_signatures {
        let pubkeys = attesters
            .iter()
            .map(|i| state.validator_pubkey(*i))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        let domain = spec.domain(state, DomainType::BeaconAttester, data.target.epoch);
        let root = spec.attestation_data_root(data);
        if !spec.verify_signature(&pubkeys, root, domain, &attestation.signature) {
            return Err("invalid aggregate signature".into());
        }
    }
    Ok(attesters)
}

pub fn process_attestation(
    spec: &MinimalSpec,
    state: &mut BeaconState,
    index: usize,
    attestation: &Attestation,
    proposer: ValidatorIndex,
) -> Result<(), TransitionError> {
    validate_attestation(spec, state, attestation)
        .map_err(|reason| TransitionError::InvalidAttestation { index, reason })?;

    let pending = PendingAttestation {
        aggregation_bits: attestation.aggregation_bits.clone(),
        data: attestation.data.clone(),
        inclusion_delay: state.slot - attestation.data.slot,
        proposer_index: proposer,
    };
    if attestation.data.target.epoch == spec.current_epoch(state) {
        state.current_epoch_attestations.push(pending);
    } else {
        state.previous_epoch_attestations.push(pending);
    }
    Ok(())
}

pub fn process_voluntary_exit(
    spec: &MinimalSpec,
    state: &mut BeaconState,
    index: usize,
    signed: &SignedVoluntaryExit,
) -> Result<(), TransitionError> {
    let invalid = |reason: &str| TransitionError::InvalidVoluntaryExit {
        index,
        reason: reason.to_string(),
    };
    let exit = &signed.message;
    let current = spec.current_epoch(state);
    let validator = state
        .validator(exit.validator_index)
        .map_err(|_| invalid("unknown validator"))?;
    if !validator.is_active_at(current) {
        return Err(invalid("validator is not active"));
    }
    if validator.has_exited() {
        return Err(invalid("exit already initiated"));
    }
    if current < exit.epoch {
        return Err(invalid("exit epoch is in the future"));
    }
    if spec.config().verify_signatures {
        let domain = spec.domain(state, DomainType::VoluntaryExit, exit.epoch);
        if !spec.verify_signature(&[validator.pubkey], tree_root(exit), domain, &signed.signature) {
            return Err(invalid("invalid signature"));
        }
    }

    let exit_epoch = current + 1 + spec.config().max_seed_lookahead;
    if let Some(v) = state.validators.get_mut(exit.validator_index as usize) {
        v.exit_epoch = exit_epoch;
    }
    Ok(())
}
