//! Ancestry lookups over chains with arbitrary skipped slots.

use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use beacon_sim_core::types::{Hash256, Slot};
use beacon_sim_harness::{BlockParams, NodeSession, ScenarioBuilder};
use beacon_sim_tests::helpers::{head_root, interop_session};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Propose at every slot whose flag is set. Returns the root per filled slot.
fn build_with_skips(s: &NodeSession, filled: &[bool]) -> BTreeMap<Slot, Hash256> {
    let mut chain = ScenarioBuilder::new(s);
    let mut roots = BTreeMap::from([(0, head_root(s))]);
    for (offset, fill) in filled.iter().enumerate() {
        let slot = offset as Slot + 1;
        s.set_current_slot(slot).unwrap();
        if *fill {
            let tuple = chain.propose_block(slot, BlockParams::default()).unwrap();
            roots.insert(slot, s.root(tuple.message()));
        }
    }
    roots
}

fn assert_ancestry(s: &NodeSession, roots: &BTreeMap<Slot, Hash256>) {
    let (&tip_slot, &tip) = roots.last_key_value().unwrap();
    assert_eq!(head_root(s), tip);
    for slot in 0..=tip_slot {
        let expected = roots.get(&slot).copied().unwrap_or(Hash256::ZERO);
        assert_eq!(
            s.block_cache().ancestor_at_slot(tip, slot).unwrap(),
            expected,
            "slot {slot}"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn every_other_slot_skipped() {
    let s = interop_session(8);
    let filled: Vec<bool> = (0..12).map(|i| i % 2 == 0).collect();
    let roots = build_with_skips(&s, &filled);
    assert_eq!(roots.len(), 7);
    assert_ancestry(&s, &roots);
}

#[test]
fn seeded_random_skips() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let filled: Vec<bool> = (0..20).map(|_| rng.gen_bool(0.6)).collect();
    let s = interop_session(8);
    let roots = build_with_skips(&s, &filled);
    assert_ancestry(&s, &roots);
}

#[test]
fn slot_above_tip_reads_as_zero() {
    let s = interop_session(8);
    let roots = build_with_skips(&s, &[true, false, true]);
    let tip = roots[&3];
    assert_eq!(s.block_cache().ancestor_at_slot(tip, 10).unwrap(), Hash256::ZERO);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn ancestry_matches_filled_slots(filled in proptest::collection::vec(any::<bool>(), 1..16)) {
        let s = interop_session(8);
        let roots = build_with_skips(&s, &filled);
        assert_ancestry(&s, &roots);
    }
}
