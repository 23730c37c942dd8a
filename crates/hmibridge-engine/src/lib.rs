//! Command dispatch and request/response correlation for an HMI bridge.
//!
//! The engine sits between client applications and a head unit. Every
//! incoming request becomes a [`Command`] built by the [`CommandFactory`]
//! from constructors contributed by [`RpcPlugin`]s. Commands issue their own
//! requests through an [`OperationContext`]; each one is recorded in the
//! [`CorrelationRegistry`] before it reaches the [`Transport`], and resolves
//! exactly once: by a reply routed through the [`EventDispatcher`], by a
//! transport failure, or by the [`TimeoutManager`] sweeping its deadline.
//! Ending a session cancels everything it owns without further callbacks.

mod arena;
mod clock;
mod command;
mod correlation;
mod dispatcher;
mod engine;
mod envelope;
mod error;
mod factory;
pub mod params;
mod plugin;
mod session;
mod subscriptions;
mod timeout;
mod transport;
mod worker;

pub use arena::CommandHandle;
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{
    Command, CommandEvent, CommandOutcome, CommandState, CompletionCallback,
    InboundRequestCommand, InboundState, Operation, OperationContext, OutboundRequestCommand,
    OutboundState, Replies, Reply, Step,
};
pub use correlation::{CorrelationRegistry, PendingEntry, ReplyMismatch};
pub use dispatcher::{
    ConnectionSender, Dispatched, EventDispatcher, Inbound, InboundQueue, InboundReceiver,
};
pub use engine::{Engine, EngineBuilder};
pub use envelope::{
    CODE_KEY, CorrelationId, Envelope, INFO_KEY, MessageType, Origin, Payload, ResultCode, VerbId,
};
pub use error::{CommandError, EngineError, ErrorKind, TransportError, ValidationError};
pub use factory::{CommandConstructor, CommandFactory, CommandKey, OperationBuilder};
pub use plugin::{PluginRegistry, RpcPlugin};
pub use session::SessionId;
pub use timeout::{TimeoutManager, TimeoutPolicy};
pub use transport::{DeviceDiscovery, RecordingTransport, Transport};
pub use worker::{StopSignal, WorkerError, WorkerHandle};

#[cfg(test)]
mod tests;
