//! Background worker threads and their stop signal.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use thiserror::Error;

/// Errors raised while starting or joining a worker thread.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The operating system refused to start the thread.
    #[error("failed to spawn worker '{name}': {source}")]
    Spawn {
        /// Worker thread name.
        name: &'static str,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The thread panicked.
    #[error("worker '{name}' panicked")]
    ThreadPanic {
        /// Worker thread name.
        name: &'static str,
    },
}

/// Shared flag asking workers to stop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    /// Creates a lowered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every holder to stop.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`StopSignal::raise`] has been called.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

/// Handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    stop: StopSignal,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns a named thread running `body` until `stop` is raised.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] when the thread cannot be created.
    pub fn spawn<F>(name: &'static str, stop: StopSignal, body: F) -> Result<Self, WorkerError>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || body(thread_stop))
            .map_err(|source| WorkerError::Spawn { name, source })?;
        Ok(Self {
            name,
            stop,
            handle: Some(handle),
        })
    }

    /// Raises the stop signal and wakes the thread if it is parked.
    pub fn shutdown(&self) {
        self.stop.raise();
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ThreadPanic`] when the thread panicked.
    pub fn join(self) -> Result<(), WorkerError> {
        self.shutdown();
        self.wait()
    }

    /// Waits for the worker to exit on its own, without raising the stop
    /// signal.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ThreadPanic`] when the thread panicked.
    pub fn wait(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| WorkerError::ThreadPanic { name: self.name }),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerHandle {
    // A joined handle no longer owns a thread, so it leaves the shared signal
    // alone.
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}
