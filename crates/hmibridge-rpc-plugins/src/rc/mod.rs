//! Remote control plugin.
//!
//! Applications ask the head unit to read or change the state of an
//! interior module (climate, radio, seats, ...). Both commands validate the
//! module description, forward it to the head unit and relay the module data
//! from its reply.

use serde_json::Value;
use tracing::debug;

use hmibridge_engine::params;
use hmibridge_engine::{
    CommandConstructor, CommandError, CommandFactory, Envelope, MessageType, Operation,
    OperationContext, Origin, Payload, Reply, ResultCode, RpcPlugin, Step, ValidationError,
};

const RC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::rc");

/// Verb changing the state of an interior module.
pub const SET_INTERIOR_VEHICLE_DATA: &str = "RC.SetInteriorVehicleData";
/// Verb reading the state of an interior module.
pub const GET_INTERIOR_VEHICLE_DATA: &str = "RC.GetInteriorVehicleData";

const MODULE_DATA: &str = "moduleData";
const MODULE_TYPE: &str = "moduleType";
const SUBSCRIBE: &str = "subscribe";
const IS_SUBSCRIBED: &str = "isSubscribed";

/// Plugin registering the remote control commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteControlPlugin;

impl RpcPlugin for RemoteControlPlugin {
    fn name(&self) -> &str {
        "RCRPCPlugin"
    }

    fn register_commands(&self, factory: &mut CommandFactory) {
        factory.register(
            Origin::FromApplication,
            SET_INTERIOR_VEHICLE_DATA,
            MessageType::Request,
            CommandConstructor::outbound(|_| SetInteriorVehicleData),
        );
        factory.register(
            Origin::FromApplication,
            GET_INTERIOR_VEHICLE_DATA,
            MessageType::Request,
            CommandConstructor::outbound(|_| GetInteriorVehicleData::default()),
        );
    }
}

fn forward(verb: &'static str, request: &Envelope, ctx: &mut OperationContext<'_>) -> Step {
    ctx.send(verb, request.payload().clone()).map_or_else(
        |error| Step::fail(CommandError::failed(ResultCode::GenericError, error.to_string())),
        |id| {
            debug!(target: RC_TARGET, verb, correlation_id = id.get(), "forwarded to HMI");
            Step::Wait
        },
    )
}

fn module_data(reply: Payload) -> Result<Value, CommandError> {
    reply
        .get(MODULE_DATA)
        .cloned()
        .ok_or_else(missing_module_data)
}

fn missing_module_data() -> CommandError {
    CommandError::failed(ResultCode::GenericError, "HMI reply carries no module data")
}

/// Changes the state of one interior module.
struct SetInteriorVehicleData;

impl Operation for SetInteriorVehicleData {
    fn validate(&self, request: &Envelope) -> Result<(), ValidationError> {
        let module = params::required_object(request.payload(), MODULE_DATA)?;
        params::required_str(module, MODULE_TYPE)?;
        Ok(())
    }

    fn start(&mut self, request: &Envelope, ctx: &mut OperationContext<'_>) -> Step {
        forward(SET_INTERIOR_VEHICLE_DATA, request, ctx)
    }

    fn on_reply(&mut self, reply: Reply, _ctx: &mut OperationContext<'_>) -> Step {
        let result = reply.into_payload().and_then(module_data).map(|data| {
            let mut result = Payload::new();
            result.insert(MODULE_DATA.to_owned(), data);
            result
        });
        Step::Complete(result)
    }
}

/// Reads the state of one interior module, optionally changing the
/// application's subscription to it.
#[derive(Default)]
struct GetInteriorVehicleData {
    subscribe: Option<bool>,
}

impl Operation for GetInteriorVehicleData {
    fn validate(&self, request: &Envelope) -> Result<(), ValidationError> {
        params::required_str(request.payload(), MODULE_TYPE)?;
        params::optional_bool(request.payload(), SUBSCRIBE)?;
        Ok(())
    }

    fn start(&mut self, request: &Envelope, ctx: &mut OperationContext<'_>) -> Step {
        self.subscribe = params::optional_bool(request.payload(), SUBSCRIBE).unwrap_or_default();
        forward(GET_INTERIOR_VEHICLE_DATA, request, ctx)
    }

    fn on_reply(&mut self, reply: Reply, _ctx: &mut OperationContext<'_>) -> Step {
        let subscribe = self.subscribe;
        let result = reply.into_payload().and_then(|payload| {
            let is_subscribed = payload.get(IS_SUBSCRIBED).and_then(Value::as_bool);
            let mut result = Payload::new();
            result.insert(MODULE_DATA.to_owned(), module_data(payload)?);
            if subscribe.is_some() {
                // A missing flag means the HMI did not subscribe.
                let granted = is_subscribed.unwrap_or(false);
                result.insert(IS_SUBSCRIBED.to_owned(), Value::Bool(granted));
            }
            Ok(result)
        });
        Step::Complete(result)
    }
}

#[cfg(test)]
mod tests;
