//! Engine configuration.
//!
//! Strongly-typed configuration for the run scheduler, loaded via the
//! `config` crate from environment variables. Every field has a default so
//! the engine runs unconfigured.

use copper_relay_flow::interpreter::InterpreterConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to already-suspended runs when their automation is
/// deactivated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendedRunPolicy {
    /// Cancel suspended runs instead of resuming them.
    #[default]
    Cancel,
    /// Let suspended runs resume and finish; only new admissions stop.
    Drain,
}

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum node executions per run; bounds graph cycles.
    #[serde(default = "default_max_steps_per_run")]
    pub max_steps_per_run: u32,

    /// Interval between scheduler ticks, in seconds.
    #[serde(default = "default_tick_interval_seconds")]
    pub tick_interval_seconds: u64,

    /// Maximum suspended runs claimed per tick.
    #[serde(default = "default_claim_batch_size")]
    pub claim_batch_size: usize,

    /// Timeout for a single collaborator call, in seconds.
    #[serde(default = "default_collaborator_timeout_seconds")]
    pub collaborator_timeout_seconds: u64,

    /// Attempts for idempotent collaborator calls (1 = no retry).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Pause between retry attempts, in seconds.
    #[serde(default = "default_retry_backoff_seconds")]
    pub retry_backoff_seconds: u64,

    /// Policy for suspended runs of deactivated automations.
    #[serde(default)]
    pub on_deactivate: SuspendedRunPolicy,
}

fn default_max_steps_per_run() -> u32 {
    500
}

fn default_tick_interval_seconds() -> u64 {
    30
}

fn default_claim_batch_size() -> usize {
    50
}

fn default_collaborator_timeout_seconds() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_seconds() -> u64 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_run: default_max_steps_per_run(),
            tick_interval_seconds: default_tick_interval_seconds(),
            claim_batch_size: default_claim_batch_size(),
            collaborator_timeout_seconds: default_collaborator_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_seconds: default_retry_backoff_seconds(),
            on_deactivate: SuspendedRunPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a present variable fails to parse.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the interpreter limits derived from this configuration.
    #[must_use]
    pub fn interpreter_config(&self) -> InterpreterConfig {
        InterpreterConfig {
            max_steps: self.max_steps_per_run,
            call_timeout: Duration::from_secs(self.collaborator_timeout_seconds),
            retry_attempts: self.retry_attempts,
            retry_backoff: Duration::from_secs(self.retry_backoff_seconds),
        }
    }

    /// Returns the tick interval as a duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_has_sensible_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_steps_per_run, 500);
        assert_eq!(config.tick_interval_seconds, 30);
        assert_eq!(config.claim_batch_size, 50);
        assert_eq!(config.on_deactivate, SuspendedRunPolicy::Cancel);
    }

    #[test]
    fn interpreter_config_mirrors_engine_config() {
        let config = EngineConfig {
            max_steps_per_run: 42,
            collaborator_timeout_seconds: 7,
            retry_attempts: 5,
            retry_backoff_seconds: 1,
            ..EngineConfig::default()
        };

        let interpreter = config.interpreter_config();
        assert_eq!(interpreter.max_steps, 42);
        assert_eq!(interpreter.call_timeout, Duration::from_secs(7));
        assert_eq!(interpreter.retry_attempts, 5);
        assert_eq!(interpreter.retry_backoff, Duration::from_secs(1));
    }

    #[test]
    fn policy_deserializes_from_snake_case() {
        let policy: SuspendedRunPolicy = serde_json::from_str("\"drain\"").expect("deserialize");
        assert_eq!(policy, SuspendedRunPolicy::Drain);
    }
}
