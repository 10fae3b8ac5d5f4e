//! Genesis state construction from chain-start deposits.

use tracing::debug;

use beacon_sim_core::constants::{
    compute_domain, DomainType, FAR_FUTURE_EPOCH, GENESIS_EPOCH, GENESIS_SLOT,
    MAX_EFFECTIVE_BALANCE,
};
use beacon_sim_core::crypto::verify_ed25519;
use beacon_sim_core::error::TransitionError;
use beacon_sim_core::genesis::ChainStart;
use beacon_sim_core::traits::ChainSpec;
use beacon_sim_core::types::{
    tree_root, BeaconBlockBody, BeaconBlockHeader, BeaconState, Checkpoint, Fork, Hash256,
    Validator,
};

use crate::spec::MinimalSpec;

pub fn initialize_beacon_state(
    spec: &MinimalSpec,
    chain_start: &ChainStart,
) -> Result<BeaconState, TransitionError> {
    let config = spec.config();
    let deposit_domain = compute_domain(DomainType::Deposit, config.genesis_fork_version);

    let mut validators = Vec::with_capacity(chain_start.deposits.len());
    for (index, deposit) in chain_start.deposits.iter().enumerate() {
        let data = &deposit.data;
        if config.verify_proof_of_possession {
            verify_ed25519(&data.pubkey, data.message_root(), deposit_domain, &data.signature)
                .map_err(|e| TransitionError::InvalidDeposit {
                    index,
                    reason: e.to_string(),
                })?;
        }
        if validators.iter().any(|v: &Validator| v.pubkey == data.pubkey) {
            return Err(TransitionError::InvalidDeposit {
                index,
                reason: "duplicate public key".into(),
            });
        }
        let effective_balance = data.amount.min(MAX_EFFECTIVE_BALANCE);
        let activation_epoch = if effective_balance == MAX_EFFECTIVE_BALANCE {
            GENESIS_EPOCH
        } else {
            FAR_FUTURE_EPOCH
        };
        validators.push(Validator {
            pubkey: data.pubkey,
            withdrawal_credentials: data.withdrawal_credentials,
            effective_balance,
            slashed: false,
            activation_epoch,
            exit_epoch: FAR_FUTURE_EPOCH,
        });
    }
    let balances = chain_start.deposits.iter().map(|d| d.data.amount).collect();

    let history = config.slots_per_historical_root as usize;
    let vector = config.epochs_per_historical_vector as usize;
    let state = BeaconState {
        genesis_time: chain_start.genesis_time,
        slot: GENESIS_SLOT,
        fork: Fork {
            previous_version: config.genesis_fork_version,
            current_version: config.genesis_fork_version,
            epoch: GENESIS_EPOCH,
        },
        latest_block_header: BeaconBlockHeader {
            body_root: tree_root(&BeaconBlockBody::empty()),
            ..Default::default()
        },
        block_roots: vec![Hash256::ZERO; history],
        state_roots: vec![Hash256::ZERO; history],
        eth1_data: chain_start.eth1_data.clone(),
        eth1_deposit_index: chain_start.deposits.len() as u64,
        validators,
        balances,
        randao_mixes: vec![chain_start.eth1_data.block_hash; vector],
        previous_epoch_attestations: Vec::new(),
        current_epoch_attestations: Vec::new(),
        justification_bits: [false; 4],
        previous_justified_checkpoint: Checkpoint::default(),
        current_justified_checkpoint: Checkpoint::default(),
        finalized_checkpoint: Checkpoint::default(),
    };
    debug!(
        validators = state.validators.len(),
        genesis_time = state.genesis_time,
        "genesis state initialized"
    );
    Ok(state)
}
