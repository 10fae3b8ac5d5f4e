//! Session parameters.
use std::path::Path;

use ::config::{Config, ConfigError, Environment, File};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::logging::{self, LogFormat};

/// Prefix for environment overrides, e.g. `BEACON_SIM_VALIDATOR_COUNT=16`.
pub const ENV_PREFIX: &str = "BEACON_SIM";

/// Interop genesis used by the reference scenarios.
pub const DEFAULT_GENESIS_UNIX: i64 = 1_569_283_190;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    /// Node name; also names the session scheduler.
    pub name: String,
    pub genesis_time: DateTime<Utc>,
    pub validator_count: u64,
    /// Append slot, block, attestation and check events to the trace.
    pub record_events: bool,
    /// Launch the node with full chain storage instead of the minimal view.
    pub chain_storage: bool,
    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format ("text" or "json").
    pub log_format: String,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            name: "node-0".to_string(),
            genesis_time: Utc
                .timestamp_opt(DEFAULT_GENESIS_UNIX, 0)
                .single()
                .unwrap_or_default(),
            validator_count: 8,
            record_events: true,
            chain_storage: false,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl SessionParams {
    /// Load from a TOML/JSON/YAML file layered under `BEACON_SIM_*`
    /// environment variables. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let params: Self = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.validator_count == 0 {
            return Err(ConfigError::Message("validator_count must be positive".into()).into());
        }
        if self.genesis_time.timestamp() < 0 {
            return Err(ConfigError::Message("genesis_time is before the Unix epoch".into()).into());
        }
        self.log_format()?;
        logging::level_filter(&self.log_level)
            .map_err(|e| ConfigError::Message(format!("log_level {:?}: {e}", self.log_level)))?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat, HarnessError> {
        Ok(self.log_format.parse().map_err(ConfigError::Message)?)
    }

    /// Install the global subscriber from `log_level` and `log_format`.
    /// Fails if the settings are invalid or a subscriber is already set.
    pub fn init_logging(&self) -> Result<(), HarnessError> {
        self.validate()?;
        logging::try_init_logging(&self.log_level, self.log_format()?)?;
        Ok(())
    }

    /// Genesis time in Unix seconds, clamped at zero.
    pub fn genesis_unix(&self) -> u64 {
        u64::try_from(self.genesis_time.timestamp()).unwrap_or(0)
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    pub fn with_validator_count(self, validator_count: u64) -> Self {
        Self {
            validator_count,
            ..self
        }
    }

    pub fn with_genesis_unix(self, seconds: i64) -> Self {
        Self {
            genesis_time: Utc.timestamp_opt(seconds, 0).single().unwrap_or(self.genesis_time),
            ..self
        }
    }

    pub fn with_chain_storage(self, chain_storage: bool) -> Self {
        Self {
            chain_storage,
            ..self
        }
    }

    pub fn with_record_events(self, record_events: bool) -> Self {
        Self {
            record_events,
            ..self
        }
    }

    pub fn with_logging(self, level: impl Into<String>, format: LogFormat) -> Self {
        Self {
            log_level: level.into(),
            log_format: format.to_string(),
            ..self
        }
    }
}
