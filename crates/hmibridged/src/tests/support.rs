//! Test doubles shared by the daemon suites.

use std::ffi::OsString;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use ortho_config::{OrthoConfig as _, OrthoError};
use serde_json::Value;

use hmibridge_config::Config;
use hmibridge_engine::{DeviceDiscovery, Envelope, Payload, StopSignal};

use crate::bootstrap::{ConfigLoader, StaticConfigLoader, default_plugins};
use crate::health::{HealthReporter, MockHealthReporter};
use crate::link::{InboundFrame, OutboundFrame};
use crate::process::{LaunchPlan, ShutdownError, ShutdownSignal};

mockall::mock! {
    pub Discovery {}

    impl DeviceDiscovery for Discovery {
        fn start_devices_discovery(&self);
        fn start_transport_manager(&self);
    }
}

/// Writer collecting everything the bridge writes to its link.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn frames(&self) -> Vec<OutboundFrame> {
        let bytes = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        String::from_utf8(bytes)
            .expect("link output is UTF-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("outbound frame decodes"))
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Shutdown that only waits for the link input to close.
pub(crate) struct InputClosed;

impl ShutdownSignal for InputClosed {
    fn wait(&self, closed: &StopSignal) -> Result<(), ShutdownError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !closed.is_raised() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }
}

/// Loader failing on a malformed command-line flag.
pub(crate) struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("hmibridged"),
            OsString::from("--request-timeout-ms"),
            OsString::from("soon"),
        ])
    }
}

pub(crate) fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub(crate) fn frame_line(session: u32, envelope: &Envelope) -> String {
    serde_json::to_string(&InboundFrame {
        session,
        envelope: envelope.clone(),
    })
    .expect("frame encodes")
}

/// Reporter accepting every lifecycle event.
pub(crate) fn permissive_reporter() -> MockHealthReporter {
    let mut reporter = MockHealthReporter::new();
    reporter.expect_bootstrap_starting().return_const(());
    reporter.expect_bootstrap_succeeded().return_const(());
    reporter.expect_bootstrap_failed().return_const(());
    reporter.expect_bridge_ready().return_const(());
    reporter.expect_shutdown_completed().return_const(());
    reporter
}

/// Discovery double accepting any number of calls.
pub(crate) fn permissive_discovery() -> MockDiscovery {
    let mut discovery = MockDiscovery::new();
    discovery.expect_start_devices_discovery().return_const(());
    discovery.expect_start_transport_manager().return_const(());
    discovery
}

/// Plan running the default plugins over `lines`, writing to `output`.
pub(crate) fn plan(
    reporter: impl HealthReporter + 'static,
    discovery: impl DeviceDiscovery + 'static,
    lines: &[String],
    output: &SharedBuffer,
) -> LaunchPlan<StaticConfigLoader, InputClosed> {
    LaunchPlan {
        loader: StaticConfigLoader::new(Config::default()),
        reporter: Arc::new(reporter),
        shutdown: InputClosed,
        discovery: Arc::new(discovery),
        plugins: default_plugins(),
        input: Box::new(Cursor::new(lines.join("\n"))),
        output: Box::new(output.clone()),
    }
}
