//! Structured health reporting for bridge lifecycle events.

use std::sync::Arc;

use hmibridge_config::Config;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer of bridge lifecycle events.
#[cfg_attr(test, mockall::automock)]
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked once the engine is built.
    fn bootstrap_succeeded(&self, config: &Config, plugins: &[String]);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the link and worker threads are running.
    fn bridge_ready(&self);

    /// Invoked after the engine released every outstanding request.
    fn shutdown_completed(&self, cancelled: usize);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config, plugins: &[String]) {
        (**self).bootstrap_succeeded(config, plugins);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn bridge_ready(&self) {
        (**self).bridge_ready();
    }

    fn shutdown_completed(&self, cancelled: usize) {
        (**self).shutdown_completed(cancelled);
    }
}

/// Reporter recording lifecycle events with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting bridge bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config, plugins: &[String]) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            request_timeout_ms = config.request_timeout_ms,
            timeout_overrides = config.timeout_overrides().len(),
            plugins = ?plugins,
            "bridge bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "bridge bootstrap failed"
        );
    }

    fn bridge_ready(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bridge_ready",
            "bridge is serving the link"
        );
    }

    fn shutdown_completed(&self, cancelled: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            cancelled,
            "bridge stopped"
        );
    }
}
