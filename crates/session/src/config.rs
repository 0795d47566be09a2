//! Orchestrator configuration.
//!
//! Environment-derived settings for the credential endpoint plus the timing
//! table the watchdogs and teardown path run on. Timings default to the
//! production values; tests construct compressed tables instead of mocking
//! the clock shape of the session.

use crate::watchdog::inactivity::{FINAL_DELAY, GOODBYE_GRACE, WARNING_DELAY};
use crate::watchdog::thinking::THINKING_DELAY;
use std::time::Duration;
use tracing::Level;

/// Bounded wait for the final persistence flush during teardown.
pub const END_PERSIST_TIMEOUT: Duration = Duration::from_millis(3_000);

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Token endpoint that exchanges conversation context for a credential.
    pub credential_endpoint: String,
    /// HTTP timeout applied to credential requests.
    pub request_timeout: Duration,
    pub log_level: Level,
}

impl OrchestratorConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let credential_endpoint = std::env::var("VOICE_TOKEN_ENDPOINT")
            .map_err(|_| ConfigError::MissingVar("VOICE_TOKEN_ENDPOINT".to_string()))?;

        let timeout_str =
            std::env::var("CREDENTIAL_TIMEOUT_MS").unwrap_or_else(|_| "10000".to_string());
        let timeout_ms = timeout_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "CREDENTIAL_TIMEOUT_MS".to_string(),
                format!("'{}' is not a number of milliseconds", timeout_str),
            )
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            credential_endpoint,
            request_timeout: Duration::from_millis(timeout_ms),
            log_level,
        })
    }
}

/// The delays a live session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Silence before the agent is asked to check in.
    pub warning_delay: Duration,
    /// Further silence, measured from the warning, before goodbye.
    pub final_delay: Duration,
    /// How long the agent gets to say goodbye before the forced disconnect.
    pub goodbye_grace: Duration,
    /// How long the agent may stay silent after a user utterance before a
    /// thinking nudge is injected.
    pub thinking_delay: Duration,
    /// How long the final persistence flush is awaited during teardown.
    pub end_persist_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            warning_delay: WARNING_DELAY,
            final_delay: FINAL_DELAY,
            goodbye_grace: GOODBYE_GRACE,
            thinking_delay: THINKING_DELAY,
            end_persist_timeout: END_PERSIST_TIMEOUT,
        }
    }
}
