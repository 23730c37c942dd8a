//! Log output for the bridge.
//!
//! stdout carries the JSON line link, so every log record goes to stderr.
//! The first successful [`initialise`] installs the global subscriber; later
//! calls are no-ops that still hand back a [`TelemetryHandle`], which lets
//! test suites bootstrap several bridges in one process.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

use hmibridge_config::{Config, LogFormat};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Proof that the bridge's log subscriber is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors raised while installing the log subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid filter expression.
    #[error("invalid log filter '{expression}': {source}")]
    Filter {
        /// Expression taken from the configuration.
        expression: String,
        /// Parser failure.
        #[source]
        source: ParseError,
    },
    /// Another global subscriber was installed first.
    #[error("failed to install the log subscriber: {source}")]
    Subscriber {
        /// Installation failure.
        #[source]
        source: TryInitError,
    },
}

/// Installs the stderr subscriber described by `config` on the first call.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the filter expression is invalid
/// and [`TelemetryError::Subscriber`] when a foreign subscriber is already
/// installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config))
        .map(|_| TelemetryHandle)
}

pub(crate) fn bridge_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|source| TelemetryError::Filter {
        expression: expression.to_owned(),
        source,
    })
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter = bridge_filter(config.log_filter())?;

    // One of the two layers is always `None`; `Option<Layer>` is a no-op
    // layer when empty.
    let (json, compact) = match config.log_format() {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_thread_names(true)
                    .with_timer(fmt::time::UtcTime::rfc_3339())
                    .with_writer(io::stderr),
            ),
            None,
        ),
        LogFormat::Compact => (
            None,
            Some(
                fmt::layer()
                    .compact()
                    .with_thread_names(true)
                    .with_ansi(io::stderr().is_terminal())
                    .with_timer(fmt::time::UtcTime::rfc_3339())
                    .with_writer(io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(compact)
        .try_init()
        .map_err(|source| TelemetryError::Subscriber { source })
}
