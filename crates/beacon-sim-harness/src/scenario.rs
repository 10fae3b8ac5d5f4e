//! Synthetic chain construction on top of a [`NodeSession`].
//!
//! [`ScenarioBuilder`] produces protocol-valid blocks and attestations for
//! the session's node, sends them through the transport and records what
//! it sent. Hooks on [`BlockParams`] and [`AttestationParams`] corrupt the
//! output at a chosen stage for negative tests.
use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use beacon_sim_core::constants::DomainType;
use beacon_sim_core::crypto::PseudoSigner;
use beacon_sim_core::traits::MessageSigner;
use beacon_sim_core::types::{
    Attestation, BeaconBlock, BeaconBlockBody, BeaconState, BeaconTuple, Signature, Signed,
    SignedBeaconBlock, Slot, ValidatorIndex,
};

use crate::attester::Attester;
use crate::error::HarnessError;
use crate::session::NodeSession;
use crate::trace::TestEvent;

/// Mutation applied to a block after its state root is stamped and before
/// it is signed.
pub type BlockHook<'f> = Box<dyn FnOnce(BeaconBlock) -> BeaconBlock + 'f>;

/// Mutation applied to every attestation at one pipeline stage.
pub type AttestationHook<'f> = Box<dyn Fn(Attestation) -> Attestation + 'f>;

/// Options for [`ScenarioBuilder::build_block`].
#[derive(Default)]
pub struct BlockParams<'f> {
    /// Parent tuple; the node's current head when absent.
    pub parent: Option<BeaconTuple>,
    /// Attestations to include; the pending buffer when absent.
    pub attestations: Option<Vec<Attestation>>,
    pub post_process: Option<BlockHook<'f>>,
}

impl<'f> BlockParams<'f> {
    pub fn with_parent(self, parent: BeaconTuple) -> Self {
        Self {
            parent: Some(parent),
            ..self
        }
    }

    pub fn with_attestations(self, attestations: Vec<Attestation>) -> Self {
        Self {
            attestations: Some(attestations),
            ..self
        }
    }

    pub fn with_post_process(self, hook: impl FnOnce(BeaconBlock) -> BeaconBlock + 'f) -> Self {
        Self {
            post_process: Some(Box::new(hook)),
            ..self
        }
    }
}

/// Options for [`ScenarioBuilder::build_attestations`].
#[derive(Default)]
pub struct AttestationParams<'f> {
    /// Tuple to attest to; the node's current head when absent.
    pub head: Option<BeaconTuple>,
    /// Attestation slot; the session's current slot when absent.
    pub slot: Option<Slot>,
    /// Only these validators attest; every assigned validator when absent.
    pub validators: Option<BTreeSet<ValidatorIndex>>,
    /// Applied before signing.
    pub post_process: Option<AttestationHook<'f>>,
    /// Applied after signing.
    pub post_sign: Option<AttestationHook<'f>>,
}

impl<'f> AttestationParams<'f> {
    pub fn with_head(self, head: BeaconTuple) -> Self {
        Self {
            head: Some(head),
            ..self
        }
    }

    pub fn with_slot(self, slot: Slot) -> Self {
        Self {
            slot: Some(slot),
            ..self
        }
    }

    pub fn with_validators(self, validators: impl IntoIterator<Item = ValidatorIndex>) -> Self {
        Self {
            validators: Some(validators.into_iter().collect()),
            ..self
        }
    }

    pub fn with_post_process(self, hook: impl Fn(Attestation) -> Attestation + 'f) -> Self {
        Self {
            post_process: Some(Box::new(hook)),
            ..self
        }
    }

    pub fn with_post_sign(self, hook: impl Fn(Attestation) -> Attestation + 'f) -> Self {
        Self {
            post_sign: Some(Box::new(hook)),
            ..self
        }
    }
}

/// Drives one session through a synthetic chain history.
pub struct ScenarioBuilder<'s> {
    session: &'s NodeSession,
    attester: Attester,
    /// Gathered attestations not yet included in a block.
    pending: Vec<Attestation>,
}

impl<'s> ScenarioBuilder<'s> {
    pub fn new(session: &'s NodeSession) -> Self {
        Self {
            session,
            attester: Attester::new(Arc::clone(session.spec())),
            pending: Vec::new(),
        }
    }

    pub fn session(&self) -> &NodeSession {
        self.session
    }

    pub fn pending_attestations(&self) -> &[Attestation] {
        &self.pending
    }

    /// The node's head block paired with its latest slot state.
    ///
    /// The node keeps no signatures, so the block is
    /// [`Signed::SignatureUnavailable`].
    pub fn head(&self) -> Result<BeaconTuple, HarnessError> {
        self.session.settle();
        let observed = self.session.observed()?;
        Ok(BeaconTuple {
            block: Signed::SignatureUnavailable(observed.head),
            state: observed.latest_slot_state,
        })
    }

    /// Advance `state` through empty slots up to `slot`.
    pub fn process_slots(&self, state: &BeaconState, slot: Slot) -> Result<BeaconState, HarnessError> {
        Ok(self.session.spec().process_slots(state, slot)?)
    }

    /// Build a signed block at `slot` together with its post-state.
    ///
    /// When no attestation list is given the pending buffer is used (up to
    /// the per-block maximum) and then cleared. The block is added to the
    /// session's block cache.
    pub fn build_block(&mut self, slot: Slot, params: BlockParams<'_>) -> Result<BeaconTuple, HarnessError> {
        let spec = Arc::clone(self.session.spec());
        let BlockParams {
            parent,
            attestations,
            post_process,
        } = params;

        let parent = match parent {
            Some(parent) => parent,
            None => self.head()?,
        };
        let parent_root = spec.block_root(parent.message());

        let pre_state = spec
            .process_slots(&parent.state, slot)
            .map_err(HarnessError::invalid_block(slot, "process_slots"))?;
        let proposer = spec
            .beacon_proposer_index(&pre_state)
            .map_err(HarnessError::invalid_block(slot, "proposer_index"))?;
        let signer = PseudoSigner::new(
            pre_state
                .validator_pubkey(proposer)
                .map_err(HarnessError::invalid_block(slot, "proposer_index"))?,
        );
        let epoch = spec.current_epoch(&pre_state);
        let randao_reveal = spec.randao_reveal(&pre_state, epoch, &signer);

        let from_buffer = attestations.is_none();
        let attestations = attestations.unwrap_or_else(|| {
            let max = spec.config().max_attestations;
            self.pending.iter().take(max).cloned().collect()
        });
        let body = BeaconBlockBody {
            randao_reveal,
            attestations,
            ..spec.empty_body()
        };
        let block = spec
            .empty_block()
            .with_slot(slot)
            .with_parent_root(parent_root)
            .with_body(body);

        // The real signature needs the state root, so transition a
        // zero-signed copy first.
        let unsigned = SignedBeaconBlock {
            message: block.clone(),
            signature: Signature::ZERO,
        };
        let post_state = spec
            .state_transition(&parent.state, &unsigned, false)
            .map_err(HarnessError::invalid_block(slot, "state_transition"))?;
        let block = block.with_state_root(spec.state_root(&post_state));

        let block = match post_process {
            Some(hook) => hook(block),
            None => block,
        };

        let domain = spec.domain(&pre_state, DomainType::BeaconProposer, epoch);
        let root = spec.block_root(&block);
        let signed = SignedBeaconBlock {
            signature: signer.sign(root, domain),
            message: block,
        };

        if from_buffer {
            self.pending.clear();
        }
        self.session.block_cache().put(root, signed.message.clone());
        debug!(
            slot,
            proposer,
            %root,
            attestations = signed.message.body.attestations.len(),
            "block built"
        );
        Ok(BeaconTuple::new(signed, post_state))
    }

    /// [`build_block`](Self::build_block), then send the block to the node.
    pub fn propose_block(&mut self, slot: Slot, params: BlockParams<'_>) -> Result<BeaconTuple, HarnessError> {
        let tuple = self.build_block(slot, params)?;
        let signed = tuple.block.clone().into_signed_block()?;
        self.send_block(&signed)?;
        Ok(tuple)
    }

    pub fn send_block(&self, block: &SignedBeaconBlock) -> Result<(), HarnessError> {
        self.publish_block(block)?;
        self.session.settle();
        Ok(())
    }

    fn publish_block(&self, block: &SignedBeaconBlock) -> Result<(), HarnessError> {
        self.session.transport().publish_block(block.clone());
        self.session.record(|| Ok(TestEvent::block(block)?))?;
        debug!(slot = block.message.slot, root = %self.session.root(&block.message), "block sent");
        Ok(())
    }

    pub fn send_attestation(&self, attestation: &Attestation) -> Result<(), HarnessError> {
        self.publish_attestation(attestation)?;
        self.session.settle();
        Ok(())
    }

    /// Send each attestation in order, one trace event per attestation.
    ///
    /// The node is drained whenever the transport backlog is full, so a
    /// batch longer than the channel capacity still arrives complete.
    pub fn send_attestations(&self, attestations: &[Attestation]) -> Result<(), HarnessError> {
        for attestation in attestations {
            if self.session.transport().attestation_backlog_full() {
                self.session.settle();
            }
            self.publish_attestation(attestation)?;
        }
        self.session.settle();
        Ok(())
    }

    fn publish_attestation(&self, attestation: &Attestation) -> Result<(), HarnessError> {
        self.session.transport().publish_attestation(attestation.clone());
        self.session.record(|| Ok(TestEvent::attestation(attestation)?))
    }

    /// Validators assigned to committees at `slot`, in committee order.
    pub fn attesters(&self, head: Option<BeaconTuple>, slot: Option<Slot>) -> Result<Vec<ValidatorIndex>, HarnessError> {
        let head = match head {
            Some(head) => head,
            None => self.head()?,
        };
        let slot = slot.unwrap_or_else(|| self.session.current_slot());
        let state = self.process_slots(&head.state, slot)?;
        let committees = self.session.spec().committees_at_slot(&state, slot)?;
        Ok(committees.into_iter().flat_map(|c| c.members).collect())
    }

    /// One signed attestation per selected committee member.
    ///
    /// Output order is committee order, then member order within each
    /// committee.
    pub fn build_attestations(&self, params: AttestationParams<'_>) -> Result<Vec<Attestation>, HarnessError> {
        let spec = self.session.spec();
        let AttestationParams {
            head,
            slot,
            validators,
            post_process,
            post_sign,
        } = params;

        let head = match head {
            Some(head) => head,
            None => self.head()?,
        };
        let slot = slot.unwrap_or_else(|| self.session.current_slot());
        let state = self.process_slots(&head.state, slot)?;
        let head_root = spec.block_root(head.message());
        let committees = spec.committees_at_slot(&state, slot)?;

        let mut out = Vec::new();
        for committee in &committees {
            for &validator in &committee.members {
                if validators.as_ref().is_some_and(|only| !only.contains(&validator)) {
                    continue;
                }
                let attestation = self.attester.attest(validator, committee, &state, head_root)?;
                let attestation = match &post_process {
                    Some(hook) => hook(attestation),
                    None => attestation,
                };

                let signer = PseudoSigner::new(state.validator_pubkey(validator)?);
                let domain = spec.domain(&state, DomainType::BeaconAttester, attestation.data.target.epoch);
                let signature = signer.sign(spec.attestation_data_root(&attestation.data), domain);
                let attestation = attestation.with_signature(signature);

                out.push(match &post_sign {
                    Some(hook) => hook(attestation),
                    None => attestation,
                });
            }
        }
        debug!(slot, %head_root, count = out.len(), "attestations built");
        Ok(out)
    }

    /// Build attestations and keep them for the next block instead of
    /// sending them.
    pub fn gather_attestations(&mut self, head: Option<BeaconTuple>, slot: Option<Slot>) -> Result<(), HarnessError> {
        let attestations = self.build_attestations(AttestationParams {
            head,
            slot,
            ..Default::default()
        })?;
        self.pending.extend(attestations);
        Ok(())
    }

    /// Build attestations and send them. Returns what was sent.
    pub fn attest_block(&self, head: Option<BeaconTuple>, slot: Option<Slot>) -> Result<Vec<Attestation>, HarnessError> {
        let attestations = self.build_attestations(AttestationParams {
            head,
            slot,
            ..Default::default()
        })?;
        self.send_attestations(&attestations)?;
        Ok(attestations)
    }

    /// Record an expected value for golden-trace comparison.
    pub fn record_check(&self, name: &str, value: impl Into<serde_json::Value>) -> Result<(), HarnessError> {
        self.session.record(|| Ok(TestEvent::check(name, value)))
    }

    pub fn add_block_check(&self, name: &str, block: &BeaconBlock) -> Result<(), HarnessError> {
        self.record_check(name, self.session.root(block).to_string())
    }

    pub fn add_head_check(&self, block: &BeaconBlock) -> Result<(), HarnessError> {
        self.add_block_check("head", block)
    }
}
