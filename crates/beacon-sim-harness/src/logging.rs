//! Tracing subscriber setup.
use std::fmt;
use std::str::FromStr;

use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

/// Filter for a configured level, ignoring `RUST_LOG`.
pub fn level_filter(level: &str) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(level)
}

/// `RUST_LOG` when set, else `level`, else `info`.
fn effective_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| level_filter(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber, failing if one is already installed.
pub fn try_init_logging(level: &str, format: LogFormat) -> Result<(), TryInitError> {
    let filter = effective_filter(level);
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
            .try_init(),
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set;
/// an unknown `format` falls back to text.
///
/// Panics if a global subscriber is already installed; use
/// [`try_init_logging`] or [`init_test_logging`] where that can happen.
pub fn init_logging(level: &str, format: &str) {
    let format = format.parse().unwrap_or_default();
    if let Err(e) = try_init_logging(level, format) {
        panic!("failed to install tracing subscriber: {e}");
    }
}

/// Test-friendly subscriber writing through the test harness capture.
/// Safe to call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
