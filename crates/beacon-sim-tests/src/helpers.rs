//! Shared helpers for the scenario tests.

use std::sync::Arc;

use beacon_sim_consensus::MinimalSpec;
use beacon_sim_core::traits::ChainSpec;
use beacon_sim_core::types::{BeaconTuple, Hash256, Slot};
use beacon_sim_harness::logging::init_test_logging;
use beacon_sim_harness::{BlockParams, HarnessError, NodeSession, ScenarioBuilder, SessionParams};
use beacon_sim_node::BeaconNodeLauncher;

/// Genesis used by the interop scenarios (2019-09-23T23:59:50Z).
pub const GENESIS_UNIX: i64 = 1_569_283_190;

pub fn minimal_spec() -> Arc<dyn ChainSpec> {
    Arc::new(MinimalSpec::default())
}

pub fn params(validators: u64) -> SessionParams {
    SessionParams::default()
        .with_validator_count(validators)
        .with_genesis_unix(GENESIS_UNIX)
}

/// Session over the reference spec and node.
pub fn new_session(params: SessionParams) -> NodeSession {
    init_test_logging();
    NodeSession::create(params, minimal_spec(), &BeaconNodeLauncher::default())
        .expect("session should start")
}

pub fn interop_session(validators: u64) -> NodeSession {
    new_session(params(validators))
}

/// Root of the node's current head.
pub fn head_root(session: &NodeSession) -> Hash256 {
    let observed = session.observed().expect("observed state");
    session.root(&observed.head)
}

/// Propose one block per slot in `slots`, gathering the attestations of
/// each new head so the next block includes them.
pub fn run_chain(
    session: &NodeSession,
    chain: &mut ScenarioBuilder<'_>,
    slots: impl IntoIterator<Item = Slot>,
) -> Result<Vec<BeaconTuple>, HarnessError> {
    let mut proposed = Vec::new();
    for slot in slots {
        session.set_current_slot(slot)?;
        proposed.push(chain.propose_block(slot, BlockParams::default())?);
        chain.gather_attestations(None, None)?;
    }
    Ok(proposed)
}

/// Eight validators; advance to slot 1, propose there and check the head.
pub fn reference_scenario(session: &NodeSession) -> Result<(), HarnessError> {
    let mut chain = ScenarioBuilder::new(session);
    session.set_current_slot(1)?;
    let block = chain.propose_block(1, BlockParams::default())?;
    chain.add_head_check(block.message())?;
    Ok(())
}
