//! End-to-end scenarios against the reference node.
//!
//! Each test drives a full session: genesis, virtual time, block and
//! attestation construction, and the node's view of the result.

use beacon_sim_core::types::{Hash256, Signed};
use beacon_sim_harness::{
    AttestationParams, BlockParams, HarnessError, ScenarioBuilder, TestEvent,
};
use beacon_sim_tests::helpers::{
    head_root, interop_session, new_session, params, reference_scenario, run_chain,
};

// ---------------------------------------------------------------------------
// Genesis and time
// ---------------------------------------------------------------------------

#[test]
fn session_starts_at_genesis() {
    let s = interop_session(8);
    let genesis = s.genesis_state().unwrap();
    assert_eq!(genesis.slot, 0);
    assert_eq!(genesis.validators.len(), 8);
    assert_eq!(s.current_slot(), 0);
    assert!(s.clock().is_sealed());
    assert!(s.events().is_empty());

    let observed = s.observed().unwrap();
    assert_eq!(observed.head.slot, 0);
    assert!(observed.pending_attestations.is_empty());
}

#[test]
fn set_current_slot_moves_node_and_records() {
    let s = interop_session(8);
    s.set_current_slot(5).unwrap();

    assert_eq!(s.current_slot(), 5);
    assert_eq!(s.current_epoch(), 0);
    assert_eq!(s.observed().unwrap().latest_slot_state.slot, 5);
    assert_eq!(s.events().events(), vec![TestEvent::Slot(5)]);

    s.set_current_slot(9).unwrap();
    assert_eq!(s.current_epoch(), 1);
    assert_eq!(s.events().len(), 2);
}

#[test]
fn recording_can_be_disabled() {
    let s = new_session(params(8).with_record_events(false));
    reference_scenario(&s).unwrap();
    assert!(s.events().is_empty());
    assert_eq!(s.observed().unwrap().head.slot, 1);
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

#[test]
fn reference_scenario_records_slot_block_and_head() {
    let s = interop_session(8);
    reference_scenario(&s).unwrap();

    let events = s.events().events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], TestEvent::Slot(1));

    let sent = events[1].decode_block().unwrap().unwrap();
    assert_eq!(sent.message.slot, 1);
    assert_eq!(s.observed().unwrap().head, sent.message);

    let root = s.root(&sent.message);
    assert_eq!(events[2], TestEvent::check("head", root.to_string()));
}

#[test]
fn blocks_chain_on_the_node_head() {
    let s = interop_session(8);
    let mut chain = ScenarioBuilder::new(&s);
    let proposed = run_chain(&s, &mut chain, 1..=4).unwrap();

    for pair in proposed.windows(2) {
        assert_eq!(pair[1].message().parent_root, s.root(pair[0].message()));
    }
    let last = proposed.last().unwrap();
    assert_eq!(head_root(&s), s.root(last.message()));
}

#[test]
fn skipped_slots_read_as_zero_in_ancestry() {
    let s = interop_session(8);
    let genesis_root = head_root(&s);
    let mut chain = ScenarioBuilder::new(&s);

    s.set_current_slot(1).unwrap();
    let b1 = chain.propose_block(1, BlockParams::default()).unwrap();
    s.set_current_slot(4).unwrap();
    let b4 = chain.propose_block(4, BlockParams::default()).unwrap();

    let cache = s.block_cache();
    let tip = s.root(b4.message());
    assert_eq!(cache.ancestor_at_slot(tip, 4).unwrap(), tip);
    assert_eq!(cache.ancestor_at_slot(tip, 3).unwrap(), Hash256::ZERO);
    assert_eq!(cache.ancestor_at_slot(tip, 2).unwrap(), Hash256::ZERO);
    assert_eq!(cache.ancestor_at_slot(tip, 1).unwrap(), s.root(b1.message()));
    // Genesis is never built by the scenario; it comes from storage.
    assert_eq!(cache.ancestor_at_slot(tip, 0).unwrap(), genesis_root);
}

#[test]
fn tampered_parent_is_rejected_by_node() {
    let s = interop_session(8);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();

    let params = BlockParams::default().with_post_process(|block| block.with_parent_root(Hash256([9; 32])));
    let tuple = chain.propose_block(1, params).unwrap();

    assert_eq!(tuple.message().parent_root, Hash256([9; 32]));
    assert_eq!(s.observed().unwrap().head.slot, 0);
    // The send is still part of the trace.
    assert!(matches!(s.events().events()[1], TestEvent::Block(_)));
}

#[test]
fn tampered_state_root_is_rejected_by_node() {
    let s = interop_session(8);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();

    let params = BlockParams::default().with_post_process(|block| block.with_state_root(Hash256([4; 32])));
    chain.propose_block(1, params).unwrap();
    assert_eq!(s.observed().unwrap().head.slot, 0);
}

#[test]
fn building_below_parent_slot_fails() {
    let s = interop_session(8);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(3).unwrap();
    let b3 = chain.propose_block(3, BlockParams::default()).unwrap();

    let err = chain
        .build_block(2, BlockParams::default().with_parent(b3))
        .unwrap_err();
    assert!(matches!(err, HarnessError::InvalidBlock { slot: 2, step: "process_slots", .. }));
}

// ---------------------------------------------------------------------------
// Attestations and finality
// ---------------------------------------------------------------------------

#[test]
fn one_attestation_per_committee_member() {
    let s = interop_session(64);
    let chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();

    let attesters = chain.attesters(None, None).unwrap();
    let attestations = chain.build_attestations(AttestationParams::default()).unwrap();
    assert_eq!(attestations.len(), attesters.len());
    assert!(attestations.iter().all(|a| a.data.slot == 1));
    assert!(attestations
        .iter()
        .all(|a| a.aggregation_bits.iter().filter(|b| **b).count() == 1));
}

#[test]
fn sent_attestations_reach_node_pool() {
    let s = interop_session(64);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();
    chain.propose_block(1, BlockParams::default()).unwrap();

    let sent = chain.attest_block(None, None).unwrap();
    assert!(!sent.is_empty());
    assert_eq!(s.observed().unwrap().pending_attestations, sent);
}

#[test]
fn included_attestations_leave_node_pool() {
    let s = interop_session(64);
    let mut chain = ScenarioBuilder::new(&s);
    s.set_current_slot(1).unwrap();
    chain.propose_block(1, BlockParams::default()).unwrap();
    let sent = chain.attest_block(None, None).unwrap();

    s.set_current_slot(2).unwrap();
    let b2 = chain
        .propose_block(2, BlockParams::default().with_attestations(sent.clone()))
        .unwrap();
    assert_eq!(b2.message().body.attestations, sent);
    assert!(s.observed().unwrap().pending_attestations.is_empty());
}

#[test]
fn four_epochs_of_full_participation_finalize() {
    let s = interop_session(8);
    let mut chain = ScenarioBuilder::new(&s);

    run_chain(&s, &mut chain, 1..=24).unwrap();
    let justified = s.storage().justified_checkpoint().unwrap().unwrap();
    assert_eq!(justified.epoch, 2);
    assert_eq!(s.storage().finalized_checkpoint().unwrap().unwrap().epoch, 0);

    let proposed = run_chain(&s, &mut chain, 25..=32).unwrap();
    let justified = s.storage().justified_checkpoint().unwrap().unwrap();
    let finalized = s.storage().finalized_checkpoint().unwrap().unwrap();
    assert_eq!(justified.epoch, 3);
    assert_eq!(finalized.epoch, 2);

    let head = &proposed.last().unwrap().state;
    assert_eq!(head.current_justified_checkpoint, justified);
    assert_eq!(head.finalized_checkpoint, finalized);
    // Finalized root is the block at the first slot of epoch 2.
    let tip = s.root(proposed.last().unwrap().message());
    assert_eq!(s.block_cache().ancestor_at_slot(tip, 16).unwrap(), finalized.root);
}

// ---------------------------------------------------------------------------
// Storage views
// ---------------------------------------------------------------------------

#[test]
fn minimal_storage_rejects_indexed_reads() {
    let s = interop_session(8);
    reference_scenario(&s).unwrap();

    let storage = s.storage();
    assert!(!storage.is_full());
    assert!(matches!(storage.slot_blocks(1), Err(HarnessError::NotImplemented("slot_blocks"))));
    assert!(matches!(storage.max_slot(), Err(HarnessError::NotImplemented("max_slot"))));
    assert!(matches!(storage.commit(), Err(HarnessError::NotImplemented("commit"))));

    let head = head_root(&s);
    let stored = storage.block(&head).unwrap().unwrap();
    assert!(!stored.is_signed());
}

#[test]
fn full_storage_tracks_accepted_blocks() {
    let s = new_session(params(8).with_chain_storage(true));
    let mut chain = ScenarioBuilder::new(&s);
    let proposed = run_chain(&s, &mut chain, 1..=3).unwrap();

    let storage = s.storage();
    assert!(storage.is_full());
    assert_eq!(storage.max_slot().unwrap(), Some(3));

    let b2 = &proposed[1];
    let root = s.root(b2.message());
    assert_eq!(storage.slot_blocks(2).unwrap(), vec![root]);

    let stored = storage.tuple(&root).unwrap().unwrap();
    assert_eq!(stored.block, b2.block);
    assert_eq!(stored.state, b2.state);
    assert!(matches!(storage.block(&root).unwrap(), Some(Signed::Signed { .. })));
}

#[test]
fn full_storage_checkpoint_writes_need_commit() {
    let s = new_session(params(8).with_chain_storage(true));
    let storage = s.storage();
    let checkpoint = beacon_sim_core::types::Checkpoint {
        epoch: 7,
        root: Hash256([7; 32]),
    };

    let before = storage.justified_checkpoint().unwrap();
    storage.set_justified_checkpoint(checkpoint).unwrap();
    assert_eq!(storage.justified_checkpoint().unwrap(), before);
    storage.commit().unwrap();
    assert_eq!(storage.justified_checkpoint().unwrap(), Some(checkpoint));
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn identical_scenarios_serialise_identically() {
    let run = || {
        let s = interop_session(16);
        let mut chain = ScenarioBuilder::new(&s);
        run_chain(&s, &mut chain, 1..=3).unwrap();
        chain.attest_block(None, None).unwrap();
        let head = chain.head().unwrap();
        chain.add_head_check(head.message()).unwrap();
        s.events().to_json().unwrap()
    };
    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert!(first.contains("\"type\": \"attestation\""));
}
