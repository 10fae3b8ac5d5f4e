//! Error types shared by the harness and its collaborators.
use thiserror::Error;

use crate::types::{Epoch, Hash256, Slot, ValidatorIndex};

/// Rejections raised by a [`ChainSpec`](crate::traits::ChainSpec) while
/// advancing slots or applying a block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot rewind state from slot {state} to slot {target}")] SlotInPast { state: Slot, target: Slot },
    #[error("block slot {block} does not match state slot {state}")] SlotMismatch { block: Slot, state: Slot },
    #[error("block slot {block} is not after parent slot {parent}")] NotAfterParent { block: Slot, parent: Slot },
    #[error("parent root mismatch: block {block}, state {state}")] ParentRootMismatch { block: Hash256, state: Hash256 },
    #[error("proposer {0} is slashed")] ProposerSlashed(ValidatorIndex),
    #[error("no active validators at epoch {0}")] NoActiveValidators(Epoch),
    #[error("validator index out of range: {0}")] UnknownValidator(ValidatorIndex),
    #[error("invalid proposer signature")] InvalidProposerSignature,
    #[error("invalid RANDAO reveal")] InvalidRandaoReveal,
    #[error("state root mismatch: block {block}, computed {computed}")] StateRootMismatch { block: Hash256, computed: Hash256 },
    #[error("too many attestations: {count} > {max}")] TooManyAttestations { count: usize, max: usize },
    #[error("invalid attestation {index}: {reason}")] InvalidAttestation { index: usize, reason: String },
    #[error("invalid voluntary exit {index}: {reason}")] InvalidVoluntaryExit { index: usize, reason: String },
    #[error("block root for slot {0} is outside the historical window")] BlockRootUnavailable(Slot),
    #[error("invalid genesis deposit {index}: {reason}")] InvalidDeposit { index: usize, reason: String },
    #[error("unsupported operation: {0}")] Unsupported(&'static str),
    #[error("codec: {0}")] Codec(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("signature verification failed")] VerificationFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("{column}: {source}")] Codec { column: &'static str, source: CodecError },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode: {0}")] Encode(String),
    #[error("decode: {0}")] Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("genesis: {0}")] Genesis(#[from] TransitionError),
    #[error("node launch failed: {0}")] Launch(String),
}

/// Raised when reading the signature of a message recovered without one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("signature is not retained for this message")]
pub struct SignatureUnavailable;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock rewind from {current} to {requested} after the timeline was sealed")] Rewind { current: u64, requested: u64 },
}
