use thiserror::Error;

use hmibridge_engine::WorkerError;

use crate::bootstrap::BootstrapError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the bridge.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the bridge failed.
    #[error("bridge bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// A worker thread could not be started or panicked.
    #[error("bridge worker failed: {source}")]
    Worker {
        /// Underlying worker error.
        #[source]
        source: WorkerError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<WorkerError> for LaunchError {
    fn from(source: WorkerError) -> Self {
        Self::Worker { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
