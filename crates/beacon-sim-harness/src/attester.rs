//! Unsigned single-validator attestations.
use std::sync::Arc;

use beacon_sim_core::error::TransitionError;
use beacon_sim_core::traits::ChainSpec;
use beacon_sim_core::types::{
    Attestation, AttestationData, Checkpoint, Committee, Hash256, BeaconState, Signature,
    ValidatorIndex,
};

/// Builds the attestation an honest validator would cast for a head.
pub struct Attester {
    spec: Arc<dyn ChainSpec>,
}

impl Attester {
    pub fn new(spec: Arc<dyn ChainSpec>) -> Self {
        Self { spec }
    }

    /// Vote of `validator`, a member of `committee`, for the block `head_root`
    /// as seen from `state` (the head state advanced to the attestation slot).
    ///
    /// Exactly the validator's aggregation bit is set; the signature is left
    /// zero for the caller to fill.
    pub fn attest(
        &self,
        validator: ValidatorIndex,
        committee: &Committee,
        state: &BeaconState,
        head_root: Hash256,
    ) -> Result<Attestation, TransitionError> {
        let position = committee
            .members
            .iter()
            .position(|member| *member == validator)
            .ok_or(TransitionError::UnknownValidator(validator))?;
        let mut aggregation_bits = vec![false; committee.members.len()];
        aggregation_bits[position] = true;

        let data = AttestationData::default()
            .with_slot(state.slot)
            .with_index(committee.index)
            .with_beacon_block_root(head_root)
            .with_source(state.current_justified_checkpoint)
            .with_target(self.target(state, head_root)?);

        Ok(Attestation {
            aggregation_bits,
            data,
            signature: Signature::ZERO,
        })
    }

    /// Checkpoint at the start of the state's epoch.
    fn target(&self, state: &BeaconState, head_root: Hash256) -> Result<Checkpoint, TransitionError> {
        let epoch = self.spec.current_epoch(state);
        let start = self.spec.epoch_start_slot(epoch);
        let root = if start == state.slot {
            head_root
        } else {
            let history = self.spec.config().slots_per_historical_root.max(1);
            state
                .block_roots
                .get((start % history) as usize)
                .copied()
                .ok_or(TransitionError::BlockRootUnavailable(start))?
        };
        Ok(Checkpoint { epoch, root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_sim_consensus::MinimalSpec;
    use beacon_sim_core::crypto::PseudoSignerFactory;
    use beacon_sim_core::genesis::ChainStart;

    fn setup() -> (Arc<MinimalSpec>, BeaconState, Hash256) {
        let spec = Arc::new(MinimalSpec::default());
        let cs = ChainStart::interop(0, 8, spec.config().genesis_fork_version, &PseudoSignerFactory);
        let state = spec.genesis_state(&cs).unwrap();
        let root = spec.block_root(&spec.genesis_block(&state));
        (spec, state, root)
    }

    #[test]
    fn single_bit_for_the_validator() {
        let (spec, state, root) = setup();
        let attester = Attester::new(spec.clone());
        let committee = &spec.committees_at_slot(&state, 0).unwrap()[0];
        let member = committee.members[committee.members.len() - 1];

        let att = attester.attest(member, committee, &state, root).unwrap();
        assert_eq!(att.aggregation_bits.iter().filter(|b| **b).count(), 1);
        assert_eq!(att.aggregation_bits.last(), Some(&true));
        assert_eq!(att.data.slot, 0);
        assert_eq!(att.data.index, committee.index);
        assert_eq!(att.data.beacon_block_root, root);
        assert!(att.signature.is_zero());
    }

    #[test]
    fn epoch_start_targets_the_head() {
        let (spec, state, root) = setup();
        let attester = Attester::new(spec.clone());
        let committee = &spec.committees_at_slot(&state, 0).unwrap()[0];
        let att = attester.attest(committee.members[0], committee, &state, root).unwrap();
        assert_eq!(att.data.target, Checkpoint { epoch: 0, root });
        assert_eq!(att.data.source, state.current_justified_checkpoint);
    }

    #[test]
    fn later_slots_target_the_epoch_boundary_block() {
        let (spec, genesis, root) = setup();
        let attester = Attester::new(spec.clone());
        let state = spec.process_slots(&genesis, 3).unwrap();
        let committee = &spec.committees_at_slot(&state, 3).unwrap()[0];
        let att = attester
            .attest(committee.members[0], committee, &state, Hash256([1; 32]))
            .unwrap();
        assert_eq!(att.data.target.root, root);
        assert_eq!(att.data.slot, 3);
    }

    #[test]
    fn non_member_is_rejected() {
        let (spec, state, root) = setup();
        let attester = Attester::new(spec);
        let committee = Committee { index: 0, members: vec![1, 2] };
        assert_eq!(
            attester.attest(5, &committee, &state, root),
            Err(TransitionError::UnknownValidator(5))
        );
    }
}
