use std::io;
use std::thread;
use std::time::Duration;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use hmibridge_engine::StopSignal;

use super::PROCESS_TARGET;

/// Decides when the bridge should stop.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed or `closed` is raised.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the listener cannot be installed.
    fn wait(&self, closed: &StopSignal) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Listener waiting for a termination signal or the end of the link.
#[derive(Debug, Clone, Copy)]
pub struct SystemShutdownSignal {
    poll_interval: Duration,
}

impl SystemShutdownSignal {
    /// Builds a listener checking for signals every `poll_interval`.
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self, closed: &StopSignal) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        loop {
            if let Some(signal) = signals.pending().next() {
                info!(target: PROCESS_TARGET, signal, "shutdown signal received");
                return Ok(());
            }
            if closed.is_raised() {
                info!(target: PROCESS_TARGET, "link closed by peer");
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }
    }
}
