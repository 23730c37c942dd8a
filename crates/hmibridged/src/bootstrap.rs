//! Bridge bootstrap orchestration.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use hmibridge_config::Config;
use hmibridge_engine::{Engine, EngineError, RpcPlugin, TimeoutPolicy, Transport};
use hmibridge_rpc_plugins::{RemoteControlPlugin, SdlCorePlugin, StaticPolicyHandler};

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Source of the bridge configuration.
pub trait ConfigLoader: Send + Sync {
    /// Loads the configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader reading the process arguments, environment and config file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_validated()
    }
}

/// Loader handing out a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A plugin could not be installed.
    #[error("failed to install plugins: {source}")]
    Plugins {
        /// Underlying engine error.
        #[source]
        source: EngineError,
    },
}

/// Plugins loaded by the daemon.
///
/// The SDL core plugin is backed by an empty static policy until a policy
/// layer is attached.
#[must_use]
pub fn default_plugins() -> Vec<Arc<dyn RpcPlugin>> {
    vec![
        Arc::new(RemoteControlPlugin),
        Arc::new(SdlCorePlugin::new(Arc::new(StaticPolicyHandler::new()))),
    ]
}

/// Result of a successful bootstrap.
#[derive(Debug)]
pub struct Bridge {
    config: Config,
    engine: Engine,
    telemetry: TelemetryHandle,
}

impl Bridge {
    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Engine with every plugin installed.
    #[must_use]
    pub const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Telemetry handle, mostly useful to tests.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }
}

/// Bootstraps the bridge with the supplied collaborators.
///
/// `hmi` carries the engine's outbound requests and its answers to the head
/// unit.
///
/// # Errors
///
/// Returns a [`BootstrapError`] when configuration, telemetry or plugin
/// installation fails. The failure is reported to `reporter` first.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    plugins: Vec<Arc<dyn RpcPlugin>>,
    hmi: Arc<dyn Transport>,
) -> Result<Bridge, BootstrapError> {
    reporter.bootstrap_starting();
    bootstrap_inner(loader, reporter, plugins, hmi).inspect_err(|error| {
        reporter.bootstrap_failed(error);
    })
}

fn bootstrap_inner(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
    plugins: Vec<Arc<dyn RpcPlugin>>,
    hmi: Arc<dyn Transport>,
) -> Result<Bridge, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let names: Vec<String> = plugins
        .iter()
        .map(|plugin| plugin.name().to_owned())
        .collect();
    let engine = plugins
        .into_iter()
        .try_fold(
            Engine::builder(hmi),
            |builder, plugin| builder.plugin(plugin),
        )
        .map_err(|source| BootstrapError::Plugins { source })?
        .timeouts(TimeoutPolicy::from_config(&config))
        .build();

    reporter.bootstrap_succeeded(&config, &names);
    Ok(Bridge {
        config,
        engine,
        telemetry,
    })
}
