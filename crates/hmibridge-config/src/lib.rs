//! Shared configuration for the HMI bridge engine and daemon.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then an
//! optional TOML file (`--config-path` or `HMIBRIDGE_CONFIG_PATH`), then
//! `HMIBRIDGE_*` environment variables, then command-line flags.

mod defaults;
mod logging;
mod timeouts;

use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SWEEP_INTERVAL_MS,
    default_log_filter, default_log_filter_string, default_log_format, default_request_timeout,
    default_request_timeout_ms, default_sweep_interval_ms,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use timeouts::{
    ANY_VERB, OriginScope, TimeoutDirective, TimeoutDirectiveParseError, deduplicate_directives,
};

/// Resolved bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "HMIBRIDGE")]
pub struct Config {
    /// `tracing` filter expression, e.g. `info,hmibridge_engine=debug`.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format of the log stream.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Deadline for outbound requests not covered by a directive.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Interval between two sweeps of the correlation registry.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Per-origin and per-verb deadline overrides.
    #[serde(default)]
    #[ortho_config(merge_strategy = "append")]
    pub timeout_overrides: Vec<TimeoutDirective>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            request_timeout_ms: default_request_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            timeout_overrides: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when a layer cannot be parsed.
    pub fn load_validated() -> Result<Self, Arc<OrthoError>> {
        Self::load().map(Self::normalised)
    }

    /// Filter expression handed to the log subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Selected log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Default request deadline.
    ///
    /// A zero value falls back to [`DEFAULT_REQUEST_TIMEOUT_MS`] so requests
    /// never expire on registration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        if self.request_timeout_ms == 0 {
            return default_request_timeout();
        }
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Interval between registry sweeps, never shorter than one millisecond.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    /// Deadline directives, deduplicated with the last directive winning.
    #[must_use]
    pub fn timeout_overrides(&self) -> &[TimeoutDirective] {
        &self.timeout_overrides
    }

    fn normalised(mut self) -> Self {
        deduplicate_directives(&mut self.timeout_overrides);
        self
    }
}
