//! Deterministic scenario harness for beacon chain nodes.
//!
//! A [`NodeSession`] runs one node against a [`VirtualClock`], a
//! [`ControlledScheduler`] and a [`TransportStub`]. A [`ScenarioBuilder`]
//! then feeds it synthetic blocks and attestations, and every step lands in
//! an [`EventTrace`] that can be checked against a golden file.
//!
//! ```no_run
//! use std::sync::Arc;
//! use beacon_sim_harness::{BlockParams, NodeSession, ScenarioBuilder, SessionParams};
//! # fn run(spec: Arc<dyn beacon_sim_core::traits::ChainSpec>,
//! #        launcher: &dyn beacon_sim_core::traits::NodeLauncher) -> Result<(), beacon_sim_harness::HarnessError> {
//! let session = NodeSession::create(SessionParams::default(), spec, launcher)?;
//! let mut chain = ScenarioBuilder::new(&session);
//! session.set_current_slot(1)?;
//! let block = chain.propose_block(1, BlockParams::default())?;
//! chain.add_head_check(block.message())?;
//! # Ok(())
//! # }
//! ```

pub mod attester;
pub mod block_cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod golden;
pub mod logging;
pub mod mailbox;
pub mod scenario;
pub mod scheduler;
pub mod session;
pub mod storage_view;
pub mod trace;
pub mod transport;

pub use crate::attester::Attester;
pub use crate::block_cache::BlockCache;
pub use crate::clock::VirtualClock;
pub use crate::config::SessionParams;
pub use crate::error::HarnessError;
pub use crate::golden::{GoldenOutcome, GoldenTrace};
pub use crate::mailbox::ObservedStateMailbox;
pub use crate::scenario::{AttestationParams, BlockParams, ScenarioBuilder};
pub use crate::scheduler::ControlledScheduler;
pub use crate::session::NodeSession;
pub use crate::storage_view::{ChainStorageView, MinimalStorage};
pub use crate::trace::{EventTrace, TestEvent, TraceError, TraceMismatch};
pub use crate::transport::TransportStub;
