//! Request deadlines and the background sweep that enforces them.
//!
//! [`TimeoutPolicy`] decides how long an outbound request may stay
//! unanswered. [`TimeoutManager`] periodically sweeps the correlation
//! registry and converts every expired entry into a
//! [`CommandError::Timeout`](crate::CommandError::Timeout) reply.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use hmibridge_config::{Config, OriginScope, default_request_timeout};

use crate::engine::Engine;
use crate::envelope::{Origin, VerbId};
use crate::worker::{StopSignal, WorkerError, WorkerHandle};

const TIMEOUT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::timeout");
const WORKER_NAME: &str = "hmibridge-timeouts";

/// Deadline lookup by origin and verb.
///
/// Resolution order: the exact `(origin, verb)` directive, then the
/// origin-wide directive, then the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutPolicy {
    default: Duration,
    origin_wide: HashMap<Origin, Duration>,
    per_verb: HashMap<(Origin, VerbId), Duration>,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(default_request_timeout())
    }
}

impl TimeoutPolicy {
    /// Creates a policy applying `default` to every request.
    #[must_use]
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            origin_wide: HashMap::new(),
            per_verb: HashMap::new(),
        }
    }

    /// Builds the policy described by the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        config
            .timeout_overrides()
            .iter()
            .fold(Self::new(config.request_timeout()), |policy, directive| {
                let origin = match directive.origin {
                    OriginScope::App => Origin::FromApplication,
                    OriginScope::Hmi => Origin::FromHmi,
                };
                let timeout = Duration::from_millis(directive.timeout_ms);
                if directive.is_origin_wide() {
                    policy.with_origin_timeout(origin, timeout)
                } else {
                    policy.with_verb_timeout(origin, directive.verb.as_str(), timeout)
                }
            })
    }

    /// Sets the deadline for every request issued for `origin`.
    #[must_use]
    pub fn with_origin_timeout(mut self, origin: Origin, timeout: Duration) -> Self {
        self.origin_wide.insert(origin, timeout);
        self
    }

    /// Sets the deadline for `verb` requests issued for `origin`.
    #[must_use]
    pub fn with_verb_timeout(
        mut self,
        origin: Origin,
        verb: impl Into<VerbId>,
        timeout: Duration,
    ) -> Self {
        self.per_verb.insert((origin, verb.into()), timeout);
        self
    }

    /// Deadline for a `verb` request issued by a command created from an
    /// `origin` message.
    #[must_use]
    pub fn timeout_for(&self, origin: Origin, verb: &VerbId) -> Duration {
        self.per_verb
            .get(&(origin, verb.clone()))
            .or_else(|| self.origin_wide.get(&origin))
            .copied()
            .unwrap_or(self.default)
    }

    /// Deadline used when no directive matches.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default
    }
}

/// Periodic sweeper of expired correlation entries.
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    engine: Engine,
    interval: Duration,
}

impl TimeoutManager {
    /// Creates a manager sweeping `engine` every `interval`.
    #[must_use]
    pub const fn new(engine: Engine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Runs one sweep at the engine clock's current instant.
    ///
    /// Returns the number of requests that timed out.
    pub fn tick(&self) -> usize {
        let expired = self.engine.sweep(self.engine.now());
        if expired > 0 {
            debug!(target: TIMEOUT_TARGET, expired, "swept expired requests");
        }
        expired
    }

    /// Starts the sweep loop on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] when the thread cannot be created.
    pub fn spawn(self, stop: StopSignal) -> Result<WorkerHandle, WorkerError> {
        WorkerHandle::spawn(WORKER_NAME, stop, move |signal| self.run(&signal))
    }

    fn run(&self, stop: &StopSignal) {
        info!(
            target: TIMEOUT_TARGET,
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "timeout manager started"
        );
        while !stop.is_raised() {
            std::thread::park_timeout(self.interval);
            if stop.is_raised() {
                break;
            }
            self.tick();
        }
        info!(target: TIMEOUT_TARGET, "timeout manager stopped");
    }
}
