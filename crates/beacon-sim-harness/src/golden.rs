//! Golden-file regression for event traces.
use std::fs;
use std::path::Path;

use tracing::info;

use crate::trace::{compare_events, EventTrace, TestEvent, TraceError};

/// Set to any value to re-record golden files instead of verifying them.
pub const UPDATE_GOLDEN_ENV: &str = "BEACON_SIM_UPDATE_GOLDEN";

/// What [`GoldenTrace::check_or_record`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoldenOutcome {
    Recorded,
    Verified,
}

/// A previously recorded trace.
#[derive(Debug, Clone, PartialEq)]
pub struct GoldenTrace {
    events: Vec<TestEvent>,
}

impl GoldenTrace {
    pub fn from_trace(trace: &EventTrace) -> Self {
        Self {
            events: trace.events(),
        }
    }

    pub fn events(&self) -> &[TestEvent] {
        &self.events
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let json = fs::read_to_string(path)?;
        let events = serde_json::from_str(&json)?;
        Ok(Self { events })
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), TraceError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut json = serde_json::to_string_pretty(&self.events)?;
        json.push('\n');
        fs::write(path, json)?;
        Ok(())
    }

    pub fn verify(&self, trace: &EventTrace) -> Result<(), TraceError> {
        Ok(compare_events(&self.events, &trace.events())?)
    }

    /// Verify `trace` against the file at `path`, recording it instead when
    /// the file does not exist or [`UPDATE_GOLDEN_ENV`] is set.
    pub fn check_or_record(path: impl AsRef<Path>, trace: &EventTrace) -> Result<GoldenOutcome, TraceError> {
        let update = std::env::var_os(UPDATE_GOLDEN_ENV).is_some();
        Self::check_or_record_with(path.as_ref(), trace, update)
    }

    fn check_or_record_with(path: &Path, trace: &EventTrace, update: bool) -> Result<GoldenOutcome, TraceError> {
        if update || !path.exists() {
            Self::from_trace(trace).write(path)?;
            info!(path = %path.display(), events = trace.len(), "golden trace recorded");
            return Ok(GoldenOutcome::Recorded);
        }
        Self::load(path)?.verify(trace)?;
        Ok(GoldenOutcome::Verified)
    }
}
