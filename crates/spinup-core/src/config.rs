use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::LaunchError;

/// Retry and polling policy for service startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total number of launch attempts (1 means no retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-attempt startup budget (in seconds)
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Delay between successive readiness checks (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay between a failed attempt and the next one (in milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            startup_timeout_secs: default_startup_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Create a new RetryPolicy with the default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RetryPolicy that gives up after the first failed attempt
    pub fn single_shot() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Create a RetryPolicy for slow-starting services (large model loads)
    pub fn patient() -> Self {
        Self {
            max_attempts: 3,
            startup_timeout_secs: 900,
            poll_interval_ms: 2_000,
            retry_delay_ms: 1_000,
        }
    }

    /// Validate the policy and return errors if invalid
    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.max_attempts == 0 {
            return Err(LaunchError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.max_attempts > 10 {
            return Err(LaunchError::InvalidConfig(
                "max_attempts should not exceed 10".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(LaunchError::InvalidConfig(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.poll_interval_ms > self.startup_timeout_secs.saturating_mul(1_000) {
            return Err(LaunchError::InvalidConfig(
                "poll_interval_ms cannot be greater than the startup timeout".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the per-attempt startup budget as Duration
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Get the poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the delay between attempts as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Check if retries are enabled (more than 1 attempt)
    pub fn retries_enabled(&self) -> bool {
        self.max_attempts > 1
    }
}

/// Description of the service process to launch
#[derive(Default, Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option))]
pub struct ServiceConfig {
    /// Logical service name, used for log naming and diagnostics
    pub name: String,
    /// Executable to run
    pub command: String,
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    #[builder(default)]
    pub working_directory: Option<PathBuf>,
    /// Literal substring whose appearance in the log confirms startup
    pub success_marker: String,
    /// Combined stdout/stderr capture file, truncated at the start of
    /// every attempt. Derived by the caller when not set explicitly.
    #[builder(default)]
    pub log_path: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.name.is_empty() {
            return Err(LaunchError::InvalidConfig(
                "service name must not be empty".to_string(),
            ));
        }
        if self.command.is_empty() {
            return Err(LaunchError::InvalidConfig(
                "command must not be empty".to_string(),
            ));
        }
        if self.success_marker.is_empty() {
            return Err(LaunchError::InvalidConfig(
                "success marker must not be empty".to_string(),
            ));
        }
        if self.log_path.is_none() {
            return Err(LaunchError::InvalidConfig(
                "log path must be set before launching".to_string(),
            ));
        }
        Ok(())
    }
}

impl ServiceConfigBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());

        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

// Default value functions for serde
fn default_max_attempts() -> u32 {
    2
}
fn default_startup_timeout_secs() -> u64 {
    300
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_retry_delay_ms() -> u64 {
    0
}
