//! Harness error taxonomy.
//!
//! Errors are raised where they are detected and never retried: a scenario
//! step either succeeds or aborts the scenario.
use thiserror::Error;

use beacon_sim_core::error::{
    ClockError, CodecError, NodeError, SignatureUnavailable, StorageError, TransitionError,
};
use beacon_sim_core::types::{Hash256, Slot};

use crate::trace::TraceError;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("genesis: {0}")] Genesis(String),
    #[error("node has not produced an observed state")] NoObservedState,
    #[error("unknown block {0}")] UnknownBlock(Hash256),
    #[error("invalid block at slot {slot}: {step} failed: {source}")] InvalidBlock { slot: Slot, step: &'static str, source: TransitionError },
    #[error("{0} requires full chain storage")] NotImplemented(&'static str),
    #[error("clock: {0}")] Clock(#[from] ClockError),
    #[error("genesis state is not captured yet")] NotInitialized,
    #[error("spec: {0}")] Transition(#[from] TransitionError),
    #[error("storage: {0}")] Storage(#[from] StorageError),
    #[error("codec: {0}")] Codec(#[from] CodecError),
    #[error("node: {0}")] Node(#[from] NodeError),
    #[error("trace: {0}")] Trace(#[from] TraceError),
    #[error(transparent)] SignatureUnavailable(#[from] SignatureUnavailable),
    #[error("config: {0}")] Config(#[from] ::config::ConfigError),
    #[error("logging: {0}")] Logging(#[from] tracing_subscriber::util::TryInitError),
}

impl HarnessError {
    /// Error mapper for a Spec rejection during block construction.
    pub(crate) fn invalid_block(slot: Slot, step: &'static str) -> impl FnOnce(TransitionError) -> Self {
        move |source| Self::InvalidBlock { slot, step, source }
    }
}
