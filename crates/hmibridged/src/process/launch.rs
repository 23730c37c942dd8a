//! Supervises bridge launch sequencing and runtime orchestration.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use tracing::info;

use hmibridge_engine::{
    DeviceDiscovery, EventDispatcher, InboundQueue, RpcPlugin, StopSignal, TimeoutManager,
};

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with, default_plugins};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::link::{JsonLineLink, Peer, spawn_reader};

use super::discovery::LoggingDeviceDiscovery;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{PROCESS_TARGET, SIGNAL_POLL};

/// Collaborators required to run the bridge.
pub struct LaunchPlan<L, S> {
    /// Configuration source.
    pub loader: L,
    /// Lifecycle observer.
    pub reporter: Arc<dyn HealthReporter>,
    /// Decides when to stop.
    pub shutdown: S,
    /// Platform hook triggered once the engine is ready.
    pub discovery: Arc<dyn DeviceDiscovery>,
    /// Plugins installed into the engine.
    pub plugins: Vec<Arc<dyn RpcPlugin>>,
    /// Reading end of the link.
    pub input: Box<dyn BufRead + Send>,
    /// Writing end of the link.
    pub output: Box<dyn Write + Send>,
}

/// Runs the bridge over stdio with the production collaborators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap fails, a worker cannot be started
/// or the signal listener cannot be installed.
pub fn run_bridge() -> Result<(), LaunchError> {
    run_bridge_with(LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        shutdown: SystemShutdownSignal::new(SIGNAL_POLL),
        discovery: Arc::new(LoggingDeviceDiscovery),
        plugins: default_plugins(),
        input: Box::new(BufReader::new(io::stdin())),
        output: Box::new(io::stdout()),
    })
}

/// Runs the bridge with injected collaborators.
///
/// When the input ends, every envelope already read is dispatched before the
/// engine shuts down. When `shutdown` fires first, unread input is abandoned.
/// Either way, requests still awaiting a reply are cancelled without
/// answering their originators.
///
/// # Errors
///
/// Returns [`LaunchError`] when bootstrap fails, a worker cannot be started
/// or `shutdown` fails.
pub fn run_bridge_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        shutdown,
        discovery,
        plugins,
        input,
        output,
    } = plan;

    let link = JsonLineLink::new(output);
    let bridge = bootstrap_with(
        &loader,
        reporter.as_ref(),
        plugins,
        Arc::new(link.transport(Peer::Hmi)),
    )?;
    let engine = bridge.engine().clone();
    discovery.start_devices_discovery();
    discovery.start_transport_manager();

    let (queue, receiver) = InboundQueue::channel();
    let stop = StopSignal::new();
    let closed = StopSignal::new();
    let dispatcher = EventDispatcher::new(engine.clone())
        .with_application_link(Arc::new(link.transport(Peer::Application)))
        .spawn(receiver, stop.clone())?;
    let sweeper =
        TimeoutManager::new(engine.clone(), bridge.config().sweep_interval()).spawn(stop)?;
    let reader = spawn_reader(input, queue, closed.clone())?;
    reporter.bridge_ready();

    let waited = shutdown.wait(&closed);
    if closed.is_raised() {
        reader.wait()?;
        dispatcher.wait()?;
    } else {
        // The reader may be blocked on input; leave it behind.
        drop(reader);
        dispatcher.join()?;
    }
    sweeper.join()?;

    let cancelled = engine.shutdown();
    reporter.shutdown_completed(cancelled);
    info!(target: PROCESS_TARGET, cancelled, "shutdown sequence completed");
    waited.map_err(LaunchError::from)
}
