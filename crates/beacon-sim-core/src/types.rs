//! Beacon chain protocol types: blocks, attestations, states.
//!
//! All scalar quantities (slots, epochs, indices, balances) are `u64` per
//! protocol convention. Roots are SHA-256 over the canonical bincode
//! encoding, see [`tree_root`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::constants::FAR_FUTURE_EPOCH;
use crate::error::{SignatureUnavailable, TransitionError};

pub type Slot = u64;
pub type Epoch = u64;
pub type ValidatorIndex = u64;
pub type CommitteeIndex = u64;
pub type Gwei = u64;
pub type Domain = u64;

/// A 32-byte hash value used for block, state and signing roots.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Also the "no block at this slot" sentinel.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interpret the first eight bytes as a little-endian integer.
    pub fn low_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(bytes)
    }

    /// Byte-wise XOR of two hashes.
    pub fn xor(&self, other: &Self) -> Self {
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Self(out)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// SHA-256 over the canonical bincode encoding of `value`.
///
/// Stands in for SSZ hash-tree-root: deterministic, collision resistant, and
/// sensitive to every field of the value.
pub fn tree_root<T: bincode::Encode>(value: &T) -> Hash256 {
    let mut hasher = Sha256::new();
    // Derived encoders only fail when the writer does; the hasher never does.
    let _ = bincode::encode_into_std_write(value, &mut hasher, bincode::config::standard());
    Hash256(hasher.finalize().into())
}

/// A 64-byte signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, bincode::Encode, bincode::Decode)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Placeholder used while the signed root is still unknown.
    pub const ZERO: Self = Self([0u8; 64]);

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 64]
    }

    /// Copy of this signature with a single bit inverted.
    pub fn flip_bit(&self, bit: usize) -> Self {
        let mut bytes = self.0;
        bytes[(bit / 8) % 64] ^= 1 << (bit % 8);
        Self(bytes)
    }

    pub fn xor(&self, other: &Self) -> Self {
        let mut out = [0u8; 64];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Self(out)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(text.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("signature must be 64 bytes"))?;
        Ok(Self(bytes))
    }
}

/// Raw 32-byte validator public key as recorded in the state.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl fmt::Display for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// An (epoch, block root) pair marking justified or finalized progress.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash256,
}

impl Checkpoint {
    pub fn with_epoch(self, epoch: Epoch) -> Self {
        Self { epoch, ..self }
    }

    pub fn with_root(self, root: Hash256) -> Self {
        Self { root, ..self }
    }
}

/// The vote carried by an attestation.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AttestationData {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub beacon_block_root: Hash256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

impl AttestationData {
    pub fn with_slot(self, slot: Slot) -> Self {
        Self { slot, ..self }
    }

    pub fn with_index(self, index: CommitteeIndex) -> Self {
        Self { index, ..self }
    }

    pub fn with_beacon_block_root(self, beacon_block_root: Hash256) -> Self {
        Self { beacon_block_root, ..self }
    }

    pub fn with_source(self, source: Checkpoint) -> Self {
        Self { source, ..self }
    }

    pub fn with_target(self, target: Checkpoint) -> Self {
        Self { target, ..self }
    }
}

/// A (possibly aggregated) signed vote of committee members.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct Attestation {
    /// One bit per committee member, in committee order.
    pub aggregation_bits: Vec<bool>,
    pub data: AttestationData,
    pub signature: Signature,
}

impl Attestation {
    pub fn with_signature(self, signature: Signature) -> Self {
        Self { signature, ..self }
    }

    pub fn with_data(self, data: AttestationData) -> Self {
        Self { data, ..self }
    }
}

/// Attestation with explicit validator indices, used by attester slashings.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct IndexedAttestation {
    pub attesting_indices: Vec<ValidatorIndex>,
    pub data: AttestationData,
    pub signature: Signature,
}

/// An attestation recorded in the state awaiting epoch processing.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct PendingAttestation {
    pub aggregation_bits: Vec<bool>,
    pub data: AttestationData,
    pub inclusion_delay: Slot,
    pub proposer_index: ValidatorIndex,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Eth1Data {
    pub deposit_root: Hash256,
    pub deposit_count: u64,
    pub block_hash: Hash256,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct DepositData {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: Hash256,
    pub amount: Gwei,
    /// Proof of possession over the deposit message root.
    pub signature: Signature,
}

impl DepositData {
    /// The signed part of a deposit: everything but the signature.
    pub fn message_root(&self) -> Hash256 {
        tree_root(&(self.pubkey, self.withdrawal_credentials, self.amount))
    }
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Deposit {
    pub proof: Vec<Hash256>,
    pub data: DepositData,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct VoluntaryExit {
    pub epoch: Epoch,
    pub validator_index: ValidatorIndex,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SignedVoluntaryExit {
    pub message: VoluntaryExit,
    pub signature: Signature,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body_root: Hash256,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: Signature,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ProposerSlashing {
    pub proposer_index: ValidatorIndex,
    pub header_1: SignedBeaconBlockHeader,
    pub header_2: SignedBeaconBlockHeader,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct AttesterSlashing {
    pub attestation_1: IndexedAttestation,
    pub attestation_2: IndexedAttestation,
}

/// Operations and randomness carried by a block.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct BeaconBlockBody {
    pub randao_reveal: Signature,
    pub eth1_data: Eth1Data,
    pub graffiti: Hash256,
    pub proposer_slashings: Vec<ProposerSlashing>,
    pub attester_slashings: Vec<AttesterSlashing>,
    pub attestations: Vec<Attestation>,
    pub deposits: Vec<Deposit>,
    pub voluntary_exits: Vec<SignedVoluntaryExit>,
}

impl BeaconBlockBody {
    /// A body whose lists are all empty.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct BeaconBlock {
    pub slot: Slot,
    pub parent_root: Hash256,
    pub state_root: Hash256,
    pub body: BeaconBlockBody,
}

impl BeaconBlock {
    /// Block template with zero roots and an empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_slot(self, slot: Slot) -> Self {
        Self { slot, ..self }
    }

    pub fn with_parent_root(self, parent_root: Hash256) -> Self {
        Self { parent_root, ..self }
    }

    pub fn with_state_root(self, state_root: Hash256) -> Self {
        Self { state_root, ..self }
    }

    pub fn with_body(self, body: BeaconBlockBody) -> Self {
        Self { body, ..self }
    }

    /// Header committing to this block; shares the block's root.
    pub fn header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: tree_root(&self.body),
        }
    }
}

/// A block as it travels over the wire.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: Signature,
}

/// A message together with its signature, when one is known.
///
/// Blocks recovered from a store that only keeps bare messages carry
/// [`Signed::SignatureUnavailable`]; reading their signature is an explicit
/// failure rather than a silent placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signed<T> {
    Signed { message: T, signature: Signature },
    SignatureUnavailable(T),
}

impl<T> Signed<T> {
    pub fn message(&self) -> &T {
        match self {
            Self::Signed { message, .. } | Self::SignatureUnavailable(message) => message,
        }
    }

    pub fn into_message(self) -> T {
        match self {
            Self::Signed { message, .. } | Self::SignatureUnavailable(message) => message,
        }
    }

    pub fn signature(&self) -> Result<&Signature, SignatureUnavailable> {
        match self {
            Self::Signed { signature, .. } => Ok(signature),
            Self::SignatureUnavailable(_) => Err(SignatureUnavailable),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed { .. })
    }
}

impl Signed<BeaconBlock> {
    /// Recover the wire form; fails when the signature was never retained.
    pub fn into_signed_block(self) -> Result<SignedBeaconBlock, SignatureUnavailable> {
        match self {
            Self::Signed { message, signature } => Ok(SignedBeaconBlock { message, signature }),
            Self::SignatureUnavailable(_) => Err(SignatureUnavailable),
        }
    }
}

impl From<SignedBeaconBlock> for Signed<BeaconBlock> {
    fn from(block: SignedBeaconBlock) -> Self {
        Self::Signed {
            message: block.message,
            signature: block.signature,
        }
    }
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Validator {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: Hash256,
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
}

impl Validator {
    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    pub fn has_exited(&self) -> bool {
        self.exit_epoch != FAR_FUTURE_EPOCH
    }
}

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Fork {
    pub previous_version: u32,
    pub current_version: u32,
    pub epoch: Epoch,
}

#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BeaconState {
    /// Genesis time in Unix seconds.
    pub genesis_time: u64,
    pub slot: Slot,
    pub fork: Fork,
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vec<Hash256>,
    pub state_roots: Vec<Hash256>,
    pub eth1_data: Eth1Data,
    pub eth1_deposit_index: u64,
    pub validators: Vec<Validator>,
    pub balances: Vec<Gwei>,
    pub randao_mixes: Vec<Hash256>,
    pub previous_epoch_attestations: Vec<PendingAttestation>,
    pub current_epoch_attestations: Vec<PendingAttestation>,
    pub justification_bits: [bool; 4],
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

impl BeaconState {
    pub fn validator(&self, index: ValidatorIndex) -> Result<&Validator, TransitionError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.validators.get(i))
            .ok_or(TransitionError::UnknownValidator(index))
    }

    pub fn validator_pubkey(&self, index: ValidatorIndex) -> Result<PublicKeyBytes, TransitionError> {
        Ok(self.validator(index)?.pubkey)
    }

    /// Indices of validators active at `epoch`, ascending.
    pub fn active_validator_indices(&self, epoch: Epoch) -> Vec<ValidatorIndex> {
        self.validators
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_active_at(epoch))
            .map(|(i, _)| i as ValidatorIndex)
            .collect()
    }

    /// Sum of effective balances of the given validators (at least 1).
    pub fn total_balance(&self, indices: impl IntoIterator<Item = ValidatorIndex>) -> Gwei {
        indices
            .into_iter()
            .filter_map(|i| self.validator(i).ok())
            .map(|v| v.effective_balance)
            .sum::<Gwei>()
            .max(1)
    }
}

/// A committee assigned to attest at a slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    pub index: CommitteeIndex,
    pub members: Vec<ValidatorIndex>,
}

/// A block paired with the state it produced; the unit threaded through
/// block construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeaconTuple {
    pub block: Signed<BeaconBlock>,
    pub state: BeaconState,
}

impl BeaconTuple {
    pub fn new(block: impl Into<Signed<BeaconBlock>>, state: BeaconState) -> Self {
        Self {
            block: block.into(),
            state,
        }
    }

    pub fn message(&self) -> &BeaconBlock {
        self.block.message()
    }
}

/// What a node exposes about itself after processing: its head block, the
/// canonical state advanced to the node's current slot, and the operations
/// it is holding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservedState {
    pub head: BeaconBlock,
    pub latest_slot_state: BeaconState,
    pub pending_attestations: Vec<Attestation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block(slot: Slot) -> BeaconBlock {
        BeaconBlock::empty()
            .with_slot(slot)
            .with_parent_root(Hash256([0x11; 32]))
    }

    // --- Hash256 ---

    #[test]
    fn hash256_zero_is_zero() {
        assert!(Hash256::ZERO.is_zero());
        assert_eq!(Hash256::ZERO, Hash256::default());
        assert!(!Hash256([1; 32]).is_zero());
    }

    #[test]
    fn hash256_display_prefixed_hex() {
        let s = Hash256([0xAB; 32]).to_string();
        assert_eq!(s.len(), 66);
        assert!(s.starts_with("0xabab"));
    }

    #[test]
    fn hash256_low_u64_little_endian() {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        bytes[1] = 2;
        assert_eq!(Hash256(bytes).low_u64(), 0x0201);
    }

    // --- tree_root ---

    #[test]
    fn tree_root_is_deterministic() {
        assert_eq!(tree_root(&sample_block(3)), tree_root(&sample_block(3)));
    }

    #[test]
    fn tree_root_changes_with_any_field() {
        let a = sample_block(3);
        let b = sample_block(4);
        let c = sample_block(3).with_state_root(Hash256([1; 32]));
        assert_ne!(tree_root(&a), tree_root(&b));
        assert_ne!(tree_root(&a), tree_root(&c));
    }

    #[test]
    fn header_commits_to_body() {
        let a = sample_block(1);
        let mut b = sample_block(1);
        b.body.graffiti = Hash256([9; 32]);
        assert_eq!(a.header().slot, 1);
        assert_ne!(a.header().body_root, b.header().body_root);
    }

    // --- Signature ---

    #[test]
    fn signature_flip_bit_changes_one_bit() {
        let flipped = Signature::ZERO.flip_bit(9);
        assert_eq!(flipped.0[1], 0b10);
        assert_eq!(flipped.flip_bit(9), Signature::ZERO);
    }

    #[test]
    fn signature_serde_hex() {
        let sig = Signature([7; 64]);
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(json.len(), 128 + 2);
        let back: Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn signature_rejects_wrong_length() {
        assert!(serde_json::from_str::<Signature>("\"abcd\"").is_err());
    }

    // --- Signed ---

    #[test]
    fn signed_exposes_signature() {
        let signed: Signed<BeaconBlock> = SignedBeaconBlock {
            message: sample_block(1),
            signature: Signature([3; 64]),
        }
        .into();
        assert!(signed.is_signed());
        assert_eq!(signed.signature().unwrap(), &Signature([3; 64]));
        assert_eq!(signed.message().slot, 1);
    }

    #[test]
    fn unavailable_signature_is_an_error() {
        let unsigned = Signed::SignatureUnavailable(sample_block(2));
        assert_eq!(unsigned.signature(), Err(SignatureUnavailable));
        assert_eq!(unsigned.clone().into_signed_block(), Err(SignatureUnavailable));
        assert_eq!(unsigned.into_message().slot, 2);
    }

    // --- BeaconState helpers ---

    #[test]
    fn active_indices_respect_epochs() {
        let v = |activation, exit| Validator {
            pubkey: PublicKeyBytes::default(),
            withdrawal_credentials: Hash256::ZERO,
            effective_balance: 10,
            slashed: false,
            activation_epoch: activation,
            exit_epoch: exit,
        };
        let state = BeaconState {
            genesis_time: 0,
            slot: 0,
            fork: Fork::default(),
            latest_block_header: BeaconBlockHeader::default(),
            block_roots: vec![],
            state_roots: vec![],
            eth1_data: Eth1Data::default(),
            eth1_deposit_index: 0,
            validators: vec![v(0, FAR_FUTURE_EPOCH), v(2, FAR_FUTURE_EPOCH), v(0, 1)],
            balances: vec![10, 10, 10],
            randao_mixes: vec![],
            previous_epoch_attestations: vec![],
            current_epoch_attestations: vec![],
            justification_bits: [false; 4],
            previous_justified_checkpoint: Checkpoint::default(),
            current_justified_checkpoint: Checkpoint::default(),
            finalized_checkpoint: Checkpoint::default(),
        };
        assert_eq!(state.active_validator_indices(0), vec![0, 2]);
        assert_eq!(state.active_validator_indices(2), vec![0, 1]);
        assert_eq!(state.total_balance([0, 1]), 20);
        assert!(state.validator(9).is_err());
    }
}
