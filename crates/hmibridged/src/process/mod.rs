//! Process lifecycle: launch sequencing, worker supervision and shutdown.

mod discovery;
mod errors;
mod launch;
mod shutdown;

use std::time::Duration;

pub use discovery::LoggingDeviceDiscovery;
pub use errors::LaunchError;
pub use launch::{LaunchPlan, run_bridge, run_bridge_with};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
pub(crate) const SIGNAL_POLL: Duration = Duration::from_millis(50);
