//! SDL core plugin.
//!
//! The head unit asks which functions an application may use. The answer
//! comes from the policy layer, which is reached through [`PolicyHandler`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use hmibridge_engine::params;
use hmibridge_engine::{
    CommandConstructor, CommandError, CommandFactory, CorrelationId, Envelope, MessageType,
    Operation, OperationContext, Origin, Payload, Reply, ResultCode, RpcPlugin, Step,
    ValidationError,
};

const SDL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sdl");

/// Verb of the head unit's permission query.
pub const GET_LIST_OF_PERMISSIONS: &str = "SDL.GetListOfPermissions";

const APP_ID: &str = "appID";
const ALLOWED_FUNCTIONS: &str = "allowedFunctions";

/// One user-consentable function group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionItem {
    /// Display name of the group.
    pub name: String,
    /// Policy identifier of the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// Consent already given, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<bool>,
}

impl PermissionItem {
    /// Creates an item awaiting consent.
    #[must_use]
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id: Some(id),
            allowed: None,
        }
    }
}

/// Source of permission lists.
#[cfg_attr(test, mockall::automock)]
pub trait PolicyHandler: Send + Sync {
    /// Function groups of the application identified by `connection_key`.
    ///
    /// A key of `0` asks for the groups of every registered application.
    fn list_of_permissions(
        &self,
        connection_key: u32,
        correlation_id: Option<CorrelationId>,
    ) -> Vec<PermissionItem>;
}

/// Policy handler serving fixed lists.
#[derive(Debug, Default, Clone)]
pub struct StaticPolicyHandler {
    by_key: HashMap<u32, Vec<PermissionItem>>,
}

impl StaticPolicyHandler {
    /// Creates a handler with no permissions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the groups of one connection key.
    #[must_use]
    pub fn with_permissions(mut self, connection_key: u32, items: Vec<PermissionItem>) -> Self {
        self.by_key.insert(connection_key, items);
        self
    }
}

impl PolicyHandler for StaticPolicyHandler {
    fn list_of_permissions(
        &self,
        connection_key: u32,
        _correlation_id: Option<CorrelationId>,
    ) -> Vec<PermissionItem> {
        if connection_key == 0 {
            let mut keys: Vec<&u32> = self.by_key.keys().collect();
            keys.sort_unstable();
            return keys
                .into_iter()
                .filter_map(|key| self.by_key.get(key))
                .flatten()
                .cloned()
                .collect();
        }
        self.by_key
            .get(&connection_key)
            .cloned()
            .unwrap_or_default()
    }
}

/// Plugin registering the SDL core commands.
#[derive(Clone)]
pub struct SdlCorePlugin {
    policy: Arc<dyn PolicyHandler>,
}

impl SdlCorePlugin {
    /// Creates the plugin around a policy handler.
    #[must_use]
    pub fn new(policy: Arc<dyn PolicyHandler>) -> Self {
        Self { policy }
    }
}

impl RpcPlugin for SdlCorePlugin {
    fn name(&self) -> &str {
        "SDLRPCPlugin"
    }

    fn register_commands(&self, factory: &mut CommandFactory) {
        let policy = Arc::clone(&self.policy);
        factory.register(
            Origin::FromHmi,
            GET_LIST_OF_PERMISSIONS,
            MessageType::Request,
            CommandConstructor::inbound(move |_| GetListOfPermissions {
                policy: Arc::clone(&policy),
            }),
        );
    }
}

struct GetListOfPermissions {
    policy: Arc<dyn PolicyHandler>,
}

impl Operation for GetListOfPermissions {
    fn validate(&self, request: &Envelope) -> Result<(), ValidationError> {
        params::optional_u32(request.payload(), APP_ID).map(|_| ())
    }

    fn start(&mut self, request: &Envelope, _ctx: &mut OperationContext<'_>) -> Step {
        let connection_key = params::optional_u32(request.payload(), APP_ID)
            .ok()
            .flatten()
            .unwrap_or(0);
        let items = self
            .policy
            .list_of_permissions(connection_key, request.correlation_id());
        debug!(
            target: SDL_TARGET,
            connection_key,
            groups = items.len(),
            "resolved permission list"
        );
        serde_json::to_value(items).map_or_else(
            |error| Step::fail(CommandError::failed(ResultCode::GenericError, error.to_string())),
            |list| {
                let mut result = Payload::new();
                result.insert(ALLOWED_FUNCTIONS.to_owned(), list);
                Step::done(result)
            },
        )
    }

    fn on_reply(&mut self, _reply: Reply, _ctx: &mut OperationContext<'_>) -> Step {
        Step::Wait
    }
}

#[cfg(test)]
mod tests;
