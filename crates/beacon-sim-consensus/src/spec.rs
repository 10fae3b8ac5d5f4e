//! [`MinimalSpec`]: the reference [`ChainSpec`] over the minimal preset.

use tracing::trace;

use beacon_sim_core::constants::{compute_domain, DomainType, SpecConfig};
use beacon_sim_core::error::TransitionError;
use beacon_sim_core::genesis::ChainStart;
use beacon_sim_core::traits::ChainSpec;
use beacon_sim_core::types::{
    tree_root, AttestationData, BeaconBlock, BeaconState, Committee, Domain, Epoch, Hash256,
    SignedBeaconBlock, Slot, ValidatorIndex,
};

use crate::{block_processing, epoch_processing, genesis, shuffling};

/// Phase-0 style beacon chain rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinimalSpec {
    config: SpecConfig,
}

impl MinimalSpec {
    pub fn new(config: SpecConfig) -> Self {
        Self { config }
    }
}

impl Default for MinimalSpec {
    fn default() -> Self {
        Self::new(SpecConfig::minimal())
    }
}

impl ChainSpec for MinimalSpec {
    fn config(&self) -> &SpecConfig {
        &self.config
    }

    fn current_slot(&self, state: Option<&BeaconState>, now_millis: u64) -> Slot {
        let Some(state) = state else {
            return 0;
        };
        let genesis = state.genesis_time.saturating_mul(1_000);
        now_millis.saturating_sub(genesis) / self.config.slot_duration_millis().max(1)
    }

    fn slot_start_time(&self, state: &BeaconState, slot: Slot) -> u64 {
        state
            .genesis_time
            .saturating_mul(1_000)
            .saturating_add(slot.saturating_mul(self.config.slot_duration_millis()))
    }

    fn beacon_proposer_index(&self, state: &BeaconState) -> Result<ValidatorIndex, TransitionError> {
        shuffling::proposer_index(&self.config, state)
    }

    fn committees_at_slot(
        &self,
        state: &BeaconState,
        slot: Slot,
    ) -> Result<Vec<Committee>, TransitionError> {
        shuffling::committees_at_slot(&self.config, state, slot)
    }

    fn domain(&self, state: &BeaconState, domain_type: DomainType, epoch: Epoch) -> Domain {
        let version = if epoch < state.fork.epoch {
            state.fork.previous_version
        } else {
            state.fork.current_version
        };
        compute_domain(domain_type, version)
    }

    fn block_root(&self, block: &BeaconBlock) -> Hash256 {
        tree_root(&block.header())
    }

    fn state_root(&self, state: &BeaconState) -> Hash256 {
        tree_root(state)
    }

    fn attestation_data_root(&self, data: &AttestationData) -> Hash256 {
        tree_root(data)
    }

    fn epoch_root(&self, epoch: Epoch) -> Hash256 {
        tree_root(&epoch)
    }

    fn process_slots(&self, state: &BeaconState, slot: Slot) -> Result<BeaconState, TransitionError> {
        if slot < state.slot {
            return Err(TransitionError::SlotInPast {
                state: state.slot,
                target: slot,
            });
        }
        let slots_per_epoch = self.config.slots_per_epoch.max(1);
        let mut state = state.clone();
        while state.slot < slot {
            epoch_processing::process_slot(self, &mut state);
            if (state.slot + 1) % slots_per_epoch == 0 {
                epoch_processing::process_epoch(self, &mut state)?;
            }
            state.slot += 1;
        }
        Ok(state)
    }

    fn state_transition(
        &self,
        state: &BeaconState,
        block: &SignedBeaconBlock,
        validate_result: bool,
    ) -> Result<BeaconState, TransitionError> {
        let message = &block.message;
        let mut state = self.process_slots(state, message.slot)?;

        if validate_result && self.config.verify_signatures {
            let proposer = self.beacon_proposer_index(&state)?;
            let pubkey = state.validator_pubkey(proposer)?;
            let domain = self.domain(
                &state,
                DomainType::BeaconProposer,
                self.epoch_at_slot(message.slot),
            );
            if !self.verify_signature(&[pubkey], self.block_root(message), domain, &block.signature) {
                return Err(TransitionError::InvalidProposerSignature);
            }
        }

        block_processing::process_block(self, &mut state, message)?;

        if validate_result {
            let computed = self.state_root(&state);
            if message.state_root != computed {
                return Err(TransitionError::StateRootMismatch {
                    block: message.state_root,
                    computed,
                });
            }
        }
        trace!(slot = message.slot, "block applied");
        Ok(state)
    }

    fn genesis_state(&self, chain_start: &ChainStart) -> Result<BeaconState, TransitionError> {
        genesis::initialize_beacon_state(self, chain_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_sim_core::crypto::{pseudo_sign, PseudoSigner, PseudoSignerFactory};
    use beacon_sim_core::types::Signature;

    const GENESIS: u64 = 1_569_283_190;

    fn genesis_state(spec: &MinimalSpec) -> BeaconState {
        let cs = ChainStart::interop(GENESIS, 8, spec.config().genesis_fork_version, &PseudoSignerFactory);
        spec.genesis_state(&cs).unwrap()
    }

    /// Build and sign a valid empty block on top of `parent_state`.
    fn valid_block(spec: &MinimalSpec, parent_state: &BeaconState, parent_root: Hash256, slot: Slot) -> SignedBeaconBlock {
        let pre = spec.process_slots(parent_state, slot).unwrap();
        let proposer = spec.beacon_proposer_index(&pre).unwrap();
        let pubkey = pre.validator_pubkey(proposer).unwrap();
        let epoch = spec.epoch_at_slot(slot);
        let mut block = spec.empty_block().with_slot(slot).with_parent_root(parent_root);
        block.body.randao_reveal = spec.randao_reveal(&pre, epoch, &PseudoSigner::new(pubkey));
        let unsigned = SignedBeaconBlock { message: block.clone(), signature: Signature::ZERO };
        let post = spec.state_transition(parent_state, &unsigned, false).unwrap();
        let block = block.with_state_root(spec.state_root(&post));
        let domain = spec.domain(&pre, DomainType::BeaconProposer, epoch);
        let signature = pseudo_sign(&pubkey, spec.block_root(&block), domain);
        SignedBeaconBlock { message: block, signature }
    }

    // --- time ---

    #[test]
    fn current_slot_saturates_before_genesis() {
        let spec = MinimalSpec::default();
        let state = genesis_state(&spec);
        assert_eq!(spec.current_slot(None, u64::MAX), 0);
        assert_eq!(spec.current_slot(Some(&state), 0), 0);
        assert_eq!(spec.current_slot(Some(&state), GENESIS * 1_000), 0);
        assert_eq!(spec.current_slot(Some(&state), GENESIS * 1_000 + 5_999), 0);
        assert_eq!(spec.current_slot(Some(&state), GENESIS * 1_000 + 6_000), 1);
    }

    #[test]
    fn slot_start_time_inverts_current_slot() {
        let spec = MinimalSpec::default();
        let state = genesis_state(&spec);
        for slot in [0, 1, 7, 100] {
            let t = spec.slot_start_time(&state, slot);
            assert_eq!(spec.current_slot(Some(&state), t), slot);
        }
    }

    #[test]
    fn epoch_helpers() {
        let spec = MinimalSpec::default();
        assert_eq!(spec.epoch_at_slot(7), 0);
        assert_eq!(spec.epoch_at_slot(8), 1);
        assert_eq!(spec.epoch_start_slot(3), 24);
    }

    // --- process_slots ---

    #[test]
    fn process_slots_same_slot_is_noop() {
        let spec = MinimalSpec::default();
        let state = genesis_state(&spec);
        assert_eq!(spec.process_slots(&state, 0).unwrap(), state);
    }

    #[test]
    fn process_slots_rejects_past() {
        let spec = MinimalSpec::default();
        let state = spec.process_slots(&genesis_state(&spec), 3).unwrap();
        assert_eq!(
            spec.process_slots(&state, 2),
            Err(TransitionError::SlotInPast { state: 3, target: 2 })
        );
    }

    // --- state_transition ---

    #[test]
    fn valid_block_passes_full_validation() {
        let spec = MinimalSpec::default();
        let genesis = genesis_state(&spec);
        let genesis_root = spec.block_root(&spec.genesis_block(&genesis));
        let block = valid_block(&spec, &genesis, genesis_root, 1);
        let post = spec.state_transition(&genesis, &block, true).unwrap();
        assert_eq!(post.slot, 1);
        assert_eq!(spec.state_root(&post), block.message.state_root);
    }

    #[test]
    fn chained_blocks_link_by_root() {
        let spec = MinimalSpec::default();
        let genesis = genesis_state(&spec);
        let genesis_root = spec.block_root(&spec.genesis_block(&genesis));
        let b1 = valid_block(&spec, &genesis, genesis_root, 1);
        let s1 = spec.state_transition(&genesis, &b1, true).unwrap();
        let b3 = valid_block(&spec, &s1, spec.block_root(&b1.message), 3);
        let s3 = spec.state_transition(&s1, &b3, true).unwrap();
        let s4 = spec.process_slots(&s3, 4).unwrap();
        assert_eq!(s4.block_roots[1], spec.block_root(&b1.message));
        assert_eq!(s4.block_roots[2], spec.block_root(&b1.message));
        assert_eq!(s4.block_roots[3], spec.block_root(&b3.message));
    }

    #[test]
    fn bad_proposer_signature_rejected() {
        let spec = MinimalSpec::default();
        let genesis = genesis_state(&spec);
        let genesis_root = spec.block_root(&spec.genesis_block(&genesis));
        let mut block = valid_block(&spec, &genesis, genesis_root, 1);
        block.signature = block.signature.flip_bit(0);
        assert_eq!(
            spec.state_transition(&genesis, &block, true),
            Err(TransitionError::InvalidProposerSignature)
        );
        assert!(spec.state_transition(&genesis, &block, false).is_ok());
    }

    #[test]
    fn wrong_state_root_rejected() {
        let spec = MinimalSpec::default();
        let genesis = genesis_state(&spec);
        let genesis_root = spec.block_root(&spec.genesis_block(&genesis));
        let block = valid_block(&spec, &genesis, genesis_root, 1);
        let tampered = SignedBeaconBlock {
            message: block.message.clone().with_state_root(Hash256([3; 32])),
            signature: block.signature,
        };
        let unchecked = MinimalSpec::new(SpecConfig {
            verify_signatures: false,
            ..SpecConfig::minimal()
        });
        assert!(matches!(
            unchecked.state_transition(&genesis, &tampered, true),
            Err(TransitionError::StateRootMismatch { .. })
        ));
    }

    #[test]
    fn fork_version_selects_domain() {
        let spec = MinimalSpec::default();
        let mut state = genesis_state(&spec);
        state.fork = beacon_sim_core::types::Fork { previous_version: 1, current_version: 2, epoch: 5 };
        assert_eq!(spec.domain(&state, DomainType::Randao, 4), compute_domain(DomainType::Randao, 1));
        assert_eq!(spec.domain(&state, DomainType::Randao, 5), compute_domain(DomainType::Randao, 2));
    }
}
