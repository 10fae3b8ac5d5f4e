//! Chain-start parameters for synthetic networks.
//!
//! Every session derives the same validator set from its validator count:
//! interop keys are deterministic, and the eth1 block hash is fixed, so two
//! sessions with equal parameters produce byte-identical genesis states.

use serde::{Deserialize, Serialize};

use crate::constants::{compute_domain, DomainType, MAX_EFFECTIVE_BALANCE};
use crate::crypto::interop_keypair;
use crate::traits::SignerFactory;
use crate::types::{tree_root, Deposit, DepositData, Eth1Data, Hash256, PublicKeyBytes};

/// Fixed eth1 block hash used by interop genesis.
pub const INTEROP_ETH1_BLOCK_HASH: Hash256 = Hash256([0x42; 32]);

/// Inputs to [`ChainSpec::genesis_state`](crate::traits::ChainSpec::genesis_state).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStart {
    /// Genesis time in Unix seconds.
    pub genesis_time: u64,
    pub eth1_data: Eth1Data,
    pub deposits: Vec<Deposit>,
}

impl ChainStart {
    /// Chain start with `validator_count` interop deposits.
    ///
    /// Each deposit carries a proof of possession produced by `signer_factory`
    /// over the deposit message root in the deposit domain of `fork_version`.
    pub fn interop(
        genesis_time: u64,
        validator_count: u64,
        fork_version: u32,
        signer_factory: &dyn SignerFactory,
    ) -> Self {
        let domain = compute_domain(DomainType::Deposit, fork_version);
        let deposits: Vec<Deposit> = (0..validator_count)
            .map(|index| {
                let keypair = interop_keypair(index);
                let mut data = DepositData {
                    pubkey: keypair.public_key(),
                    withdrawal_credentials: withdrawal_credentials(&keypair.public_key()),
                    amount: MAX_EFFECTIVE_BALANCE,
                    signature: Default::default(),
                };
                data.signature = signer_factory.signer(&keypair).sign(data.message_root(), domain);
                Deposit {
                    proof: Vec::new(),
                    data,
                }
            })
            .collect();

        let data: Vec<&DepositData> = deposits.iter().map(|d| &d.data).collect();
        let eth1_data = Eth1Data {
            deposit_root: tree_root(&data),
            deposit_count: validator_count,
            block_hash: INTEROP_ETH1_BLOCK_HASH,
        };

        Self {
            genesis_time,
            eth1_data,
            deposits,
        }
    }

    pub fn genesis_time_millis(&self) -> u64 {
        self.genesis_time.saturating_mul(1_000)
    }

    pub fn validator_count(&self) -> usize {
        self.deposits.len()
    }
}

/// BLS-style withdrawal credentials: a zero prefix byte and a key hash.
fn withdrawal_credentials(pubkey: &PublicKeyBytes) -> Hash256 {
    let mut bytes: [u8; 32] = blake3::hash(&pubkey.0).into();
    bytes[0] = 0;
    Hash256(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GENESIS_FORK_VERSION;
    use crate::crypto::{verify_ed25519, KeyPairSignerFactory, PseudoSignerFactory};

    #[test]
    fn interop_is_deterministic() {
        let a = ChainStart::interop(100, 4, GENESIS_FORK_VERSION, &PseudoSignerFactory);
        let b = ChainStart::interop(100, 4, GENESIS_FORK_VERSION, &PseudoSignerFactory);
        assert_eq!(a, b);
        assert_eq!(a.validator_count(), 4);
        assert_eq!(a.eth1_data.deposit_count, 4);
        assert_eq!(a.genesis_time_millis(), 100_000);
    }

    #[test]
    fn interop_deposits_use_distinct_keys() {
        let cs = ChainStart::interop(0, 8, GENESIS_FORK_VERSION, &PseudoSignerFactory);
        let keys: std::collections::HashSet<_> = cs.deposits.iter().map(|d| d.data.pubkey).collect();
        assert_eq!(keys.len(), 8);
        assert!(cs.deposits.iter().all(|d| d.data.withdrawal_credentials.0[0] == 0));
    }

    #[test]
    fn real_signer_produces_valid_proofs_of_possession() {
        let cs = ChainStart::interop(0, 3, GENESIS_FORK_VERSION, &KeyPairSignerFactory);
        let domain = compute_domain(DomainType::Deposit, GENESIS_FORK_VERSION);
        for deposit in &cs.deposits {
            let data = &deposit.data;
            assert!(verify_ed25519(&data.pubkey, data.message_root(), domain, &data.signature).is_ok());
        }
    }

    #[test]
    fn zero_validators_is_empty() {
        let cs = ChainStart::interop(0, 0, GENESIS_FORK_VERSION, &PseudoSignerFactory);
        assert!(cs.deposits.is_empty());
    }
}
