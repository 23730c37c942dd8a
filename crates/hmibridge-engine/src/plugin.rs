//! RPC plugins: bundles of command registrations.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::error::EngineError;
use crate::factory::CommandFactory;

const PLUGIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::plugin");

/// A family of commands installed into the [`CommandFactory`] at startup.
pub trait RpcPlugin: Send + Sync {
    /// Unique plugin name.
    fn name(&self) -> &str;

    /// Registers the plugin's commands.
    fn register_commands(&self, factory: &mut CommandFactory);
}

/// Ordered set of plugins with unique names.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn RpcPlugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(self.plugins.iter().map(|plugin| plugin.name()))
            .finish()
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicatePlugin`] when a plugin with the same
    /// name is already registered.
    pub fn register(&mut self, plugin: Arc<dyn RpcPlugin>) -> Result<(), EngineError> {
        if self.get(plugin.name()).is_some() {
            return Err(EngineError::duplicate_plugin(plugin.name()));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Looks up a plugin by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn RpcPlugin>> {
        self.plugins.iter().find(|plugin| plugin.name() == name)
    }

    /// Plugin names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    /// Installs every plugin's commands, in registration order.
    pub fn install(&self, factory: &mut CommandFactory) {
        for plugin in &self.plugins {
            let before = factory.len();
            plugin.register_commands(factory);
            info!(
                target: PLUGIN_TARGET,
                plugin = plugin.name(),
                added = factory.len().saturating_sub(before),
                "installed RPC plugin"
            );
        }
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` when no plugin is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
