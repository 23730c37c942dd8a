//! Daemon hosting the HMI bridge engine.
//!
//! The daemon loads layered configuration, installs structured telemetry and
//! builds an engine with the remote control and SDL core plugins. It then
//! speaks JSON lines over stdio: every input line is an envelope tagged with
//! the session it belongs to, and every output line is an envelope addressed
//! either to the head unit or to an application. A dispatcher thread and a
//! timeout thread drive the engine until stdin closes or a termination signal
//! arrives, after which every outstanding request is cancelled.

mod bootstrap;
mod health;
mod link;
mod process;
mod telemetry;

pub use bootstrap::{
    BootstrapError, Bridge, ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
    default_plugins,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use link::{InboundFrame, JsonLineLink, JsonLineTransport, OutboundFrame, Peer, spawn_reader};
pub use process::{
    LaunchError, LaunchPlan, LoggingDeviceDiscovery, ShutdownError, ShutdownSignal,
    SystemShutdownSignal, run_bridge, run_bridge_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
