//! Adversarial scenarios: malformed blocks and attestations built through
//! the scenario hooks, and misuse of the virtual clock.
//!
//! Attack vectors covered:
//! - Forged proposer signature
//! - Block from a future slot
//! - Replayed block
//! - Attestation signature corrupted after signing
//! - Attestation for an unknown committee
//! - Attestation flood longer than the transport buffer
//! - Clock rewind after genesis

use beacon_sim_core::error::{ClockError, TransitionError};
use beacon_sim_core::types::Hash256;
use beacon_sim_harness::transport::DEFAULT_CHANNEL_CAPACITY;
use beacon_sim_harness::{AttestationParams, BlockParams, HarnessError, ScenarioBuilder, TestEvent};
use beacon_sim_tests::helpers::{head_root, interop_session};

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

#[test]
fn forged_block_signature_rejected() {
    let s = interop_session(8);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();

    let tuple = chain.build_block(1, BlockParams::default()).unwrap();
    let mut signed = tuple.block.into_signed_block().unwrap();
    signed.signature = signed.signature.flip_bit(3);
    chain.send_block(&signed).unwrap();

    assert_eq!(s.observed().unwrap().head.slot, 0);
}

#[test]
fn block_from_the_future_rejected() {
    let s = interop_session(8);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();

    // Valid in every respect except timing.
    chain.propose_block(3, BlockParams::default()).unwrap();
    assert_eq!(s.observed().unwrap().head.slot, 0);

    // Once the clock catches up the same block would be accepted.
    s.set_current_slot(3).unwrap();
    chain.propose_block(3, BlockParams::default()).unwrap();
    assert_eq!(s.observed().unwrap().head.slot, 3);
}

#[test]
fn replayed_block_is_idempotent() {
    let s = interop_session(8);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();

    let tuple = chain.propose_block(1, BlockParams::default()).unwrap();
    let head = head_root(&s);
    let signed = tuple.block.into_signed_block().unwrap();
    chain.send_block(&signed).unwrap();

    assert_eq!(head_root(&s), head);
    let blocks = s
        .events()
        .events()
        .into_iter()
        .filter(|e| matches!(e, TestEvent::Block(_)))
        .count();
    assert_eq!(blocks, 2);
}

// ---------------------------------------------------------------------------
// Attestations
// ---------------------------------------------------------------------------

#[test]
fn corrupted_attestation_signature_rejected() {
    let s = interop_session(64);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();
    chain.propose_block(1, BlockParams::default()).unwrap();

    let params = AttestationParams::default()
        .with_post_sign(|a| {
            let signature = a.signature.flip_bit(0);
            a.with_signature(signature)
        });
    let forged = chain.build_attestations(params).unwrap();
    assert!(!forged.is_empty());
    chain.send_attestations(&forged).unwrap();

    assert!(s.observed().unwrap().pending_attestations.is_empty());
    assert_eq!(s.events().len(), 2 + forged.len());
}

#[test]
fn unknown_committee_rejected_by_node_and_by_block_processing() {
    let s = interop_session(8);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();
    chain.propose_block(1, BlockParams::default()).unwrap();

    let params = AttestationParams::default().with_post_process(|mut a| {
        a.data.index = 99;
        a
    });
    let bogus = chain.build_attestations(params).unwrap();
    chain.send_attestations(&bogus).unwrap();
    assert!(s.observed().unwrap().pending_attestations.is_empty());

    s.set_current_slot(2).unwrap();
    let err = chain
        .build_block(2, BlockParams::default().with_attestations(bogus))
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::InvalidBlock {
            slot: 2,
            step: "state_transition",
            source: TransitionError::InvalidAttestation { index: 0, .. },
        }
    ));
}

#[test]
fn attestation_for_wrong_head_still_gossips() {
    let s = interop_session(64);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();
    chain.propose_block(1, BlockParams::default()).unwrap();

    let params = AttestationParams::default().with_post_process(|mut a| {
        a.data.beacon_block_root = Hash256([0xee; 32]);
        a
    });
    let votes = chain.build_attestations(params).unwrap();
    chain.send_attestations(&votes).unwrap();
    // Gossip does not check the voted head, only committee and signature.
    assert_eq!(s.observed().unwrap().pending_attestations, votes);
}

#[test]
fn flood_larger_than_buffer_does_not_drop_valid_votes() {
    let s = interop_session(64);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();
    chain.propose_block(1, BlockParams::default()).unwrap();

    let valid = chain.build_attestations(AttestationParams::default()).unwrap();
    let junk = {
        let first = valid[0].clone();
        let signature = first.signature.flip_bit(0);
        first.with_signature(signature)
    };
    let mut batch = valid.clone();
    batch.extend(std::iter::repeat_n(junk, DEFAULT_CHANNEL_CAPACITY + 100));
    chain.send_attestations(&batch).unwrap();

    assert_eq!(s.observed().unwrap().pending_attestations, valid);
    assert_eq!(s.events().len(), 2 + batch.len());
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

#[test]
fn clock_cannot_rewind_after_genesis() {
    let s = interop_session(8);
    s.set_current_slot(4).unwrap();
    let now = s.clock().now();

    let err = s.set_current_slot(2).unwrap_err();
    assert!(matches!(err, HarnessError::Clock(ClockError::Rewind { current, .. }) if current == now));
    assert_eq!(s.current_slot(), 4);
    // The failed step leaves no trace.
    assert_eq!(s.events().events(), vec![TestEvent::Slot(4)]);
}

#[test]
fn same_slot_is_not_a_rewind() {
    let s = interop_session(8);
    s.set_current_slot(4).unwrap();
    s.set_current_slot(4).unwrap();
    assert_eq!(s.events().len(), 2);
}
