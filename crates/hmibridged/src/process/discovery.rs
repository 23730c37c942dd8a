use tracing::info;

use hmibridge_engine::DeviceDiscovery;

use super::PROCESS_TARGET;

/// Device discovery for the stdio link, which is connected before the
/// bridge starts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDeviceDiscovery;

impl DeviceDiscovery for LoggingDeviceDiscovery {
    fn start_devices_discovery(&self) {
        info!(
            target: PROCESS_TARGET,
            "stdio link is already connected; skipping device discovery"
        );
    }

    fn start_transport_manager(&self) {
        info!(target: PROCESS_TARGET, "transport manager started");
    }
}
