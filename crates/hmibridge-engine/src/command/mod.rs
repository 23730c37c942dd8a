//! Commands: one unit of RPC work and its lifecycle.
//!
//! A [`Command`] wraps a plugin-supplied [`Operation`] in one of two state
//! machines. [`OutboundRequestCommand`] serves requests initiated on the
//! application side and reports its result through a completion callback.
//! [`InboundRequestCommand`] serves requests initiated by the head unit and
//! answers them with exactly one response or error envelope.
//!
//! The engine drives every command through `init`, then `run`, then zero or
//! more `on_event` calls. Each call happens with the command's lock held, so
//! a command never observes two events concurrently.

mod context;
mod inbound;
mod outbound;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

pub use context::OperationContext;
pub use inbound::{InboundRequestCommand, InboundState};
pub use outbound::{OutboundRequestCommand, OutboundState};

use serde_json::Value;

use crate::envelope::{CorrelationId, Envelope, Payload, ResultCode, VerbId};
use crate::error::{CommandError, ValidationError};

const COMMAND_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::command");

/// What an operation wants to happen after a callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Keep the command alive until the next event.
    Wait,
    /// Finish the command with this result.
    Complete(Result<Payload, CommandError>),
}

impl Step {
    /// Finishes successfully.
    #[must_use]
    pub const fn done(payload: Payload) -> Self {
        Self::Complete(Ok(payload))
    }

    /// Finishes with an error.
    #[must_use]
    pub const fn fail(error: CommandError) -> Self {
        Self::Complete(Err(error))
    }
}

/// Outcome of one outbound request, delivered exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    correlation_id: CorrelationId,
    verb: VerbId,
    outcome: Result<Envelope, CommandError>,
}

impl Reply {
    /// Builds a reply from a response or error envelope.
    pub(crate) fn from_envelope(
        correlation_id: CorrelationId,
        verb: VerbId,
        envelope: Envelope,
    ) -> Self {
        let outcome = match envelope.error_details() {
            Some((code, info)) => Err(CommandError::Rejected {
                verb: verb.clone(),
                code,
                info,
            }),
            None => Ok(envelope),
        };
        Self {
            correlation_id,
            verb,
            outcome,
        }
    }

    pub(crate) const fn failure(
        correlation_id: CorrelationId,
        verb: VerbId,
        error: CommandError,
    ) -> Self {
        Self {
            correlation_id,
            verb,
            outcome: Err(error),
        }
    }

    /// Correlation id of the request being answered.
    #[must_use]
    pub const fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Verb of the request being answered.
    #[must_use]
    pub const fn verb(&self) -> &VerbId {
        &self.verb
    }

    /// Response envelope, or the reason none arrived.
    #[must_use]
    pub const fn outcome(&self) -> &Result<Envelope, CommandError> {
        &self.outcome
    }

    /// Consumes the reply, returning the response payload or the failure.
    ///
    /// # Errors
    ///
    /// Returns the failure when the request was rejected, timed out or could
    /// not be sent.
    pub fn into_payload(self) -> Result<Payload, CommandError> {
        self.outcome.map(Envelope::into_payload)
    }
}

/// Aggregates the replies of a fan-out.
///
/// An operation registers every id it sends with [`Replies::expect`], feeds
/// each reply to [`Replies::record`] and completes once
/// [`Replies::is_complete`] holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Replies {
    awaited: BTreeSet<CorrelationId>,
    received: BTreeMap<CorrelationId, Payload>,
}

impl Replies {
    /// Creates an empty aggregate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an id to wait for.
    pub fn expect(&mut self, id: CorrelationId) {
        self.awaited.insert(id);
    }

    /// Records one reply.
    ///
    /// # Errors
    ///
    /// Returns the reply's failure; the id no longer counts as awaited.
    pub fn record(&mut self, reply: Reply) -> Result<(), CommandError> {
        let id = reply.correlation_id();
        self.awaited.remove(&id);
        let payload = reply.into_payload()?;
        self.received.insert(id, payload);
        Ok(())
    }

    /// Returns `true` once every expected id has been recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.awaited.is_empty()
    }

    /// Payload received for `id`.
    #[must_use]
    pub fn get(&self, id: CorrelationId) -> Option<&Payload> {
        self.received.get(&id)
    }

    /// Every received payload, keyed by the decimal correlation id.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.received
            .into_iter()
            .map(|(id, payload)| (id.to_string(), Value::Object(payload)))
            .collect()
    }
}

/// Event delivered to a running command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    /// Resolution of one of the command's outbound requests.
    Reply(Reply),
    /// Notification matching one of the command's subscriptions.
    Notification(Envelope),
}

/// Final result of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// Verb of the request that created the command.
    pub verb: VerbId,
    /// Correlation id of the request that created the command.
    pub correlation_id: Option<CorrelationId>,
    /// Result payload, or the failure.
    pub result: Result<Payload, CommandError>,
}

/// Callback receiving an outbound command's result.
pub type CompletionCallback = Box<dyn FnOnce(CommandOutcome) + Send>;

/// Plugin-specific behaviour of a command.
///
/// Operations never touch the correlation registry or the transport directly;
/// everything goes through the [`OperationContext`].
pub trait Operation: Send {
    /// Checks the request parameters. Nothing is sent when this fails.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the offending parameter.
    fn validate(&self, request: &Envelope) -> Result<(), ValidationError>;

    /// Performs the operation's first step.
    fn start(&mut self, request: &Envelope, ctx: &mut OperationContext<'_>) -> Step;

    /// Consumes the resolution of one outbound request.
    fn on_reply(&mut self, reply: Reply, ctx: &mut OperationContext<'_>) -> Step;

    /// Consumes a notification the command subscribed to.
    fn on_notification(&mut self, notification: &Envelope, ctx: &mut OperationContext<'_>) -> Step {
        debug!(
            target: COMMAND_TARGET,
            verb = %notification.verb(),
            owner = %ctx.handle(),
            "ignoring notification"
        );
        Step::Wait
    }
}

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// State of an outbound command.
    Outbound(OutboundState),
    /// State of an inbound command.
    Inbound(InboundState),
}

impl CommandState {
    /// Returns `true` once the command has produced its result.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Outbound(OutboundState::Resolved) | Self::Inbound(InboundState::Replied)
        )
    }
}

/// A unit of RPC work.
pub enum Command {
    /// Request initiated on the application side.
    Outbound(OutboundRequestCommand),
    /// Request initiated by the head unit.
    Inbound(InboundRequestCommand),
}

impl Command {
    /// Validates the request parameters.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] raised by the operation.
    pub fn init(&mut self) -> Result<(), ValidationError> {
        match self {
            Self::Outbound(command) => command.init(),
            Self::Inbound(command) => command.init(),
        }
    }

    /// Starts the operation.
    pub fn run(&mut self, ctx: &mut OperationContext<'_>) {
        match self {
            Self::Outbound(command) => command.run(ctx),
            Self::Inbound(command) => command.run(ctx),
        }
    }

    /// Resumes the operation with an event.
    pub fn on_event(&mut self, event: CommandEvent, ctx: &mut OperationContext<'_>) {
        match self {
            Self::Outbound(command) => command.on_event(event, ctx),
            Self::Inbound(command) => command.on_event(event, ctx),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CommandState {
        match self {
            Self::Outbound(command) => CommandState::Outbound(command.state()),
            Self::Inbound(command) => CommandState::Inbound(command.state()),
        }
    }

    /// Returns `true` once the command has produced its result.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Request that created the command.
    #[must_use]
    pub const fn request(&self) -> &Envelope {
        match self {
            Self::Outbound(command) => command.request(),
            Self::Inbound(command) => command.request(),
        }
    }

    /// Takes the final result once the command is terminal.
    pub fn take_outcome(&mut self) -> Option<CommandOutcome> {
        let result = match self {
            Self::Outbound(command) => command.take_result(),
            Self::Inbound(command) => command.take_result(),
        }?;
        let request = self.request();
        Some(CommandOutcome {
            verb: request.verb().clone(),
            correlation_id: request.correlation_id(),
            result,
        })
    }
}

/// Tracks an operation and the ids it still waits on.
struct Progress {
    operation: Box<dyn Operation>,
    pending: BTreeSet<CorrelationId>,
}

impl Progress {
    fn new(operation: Box<dyn Operation>) -> Self {
        Self {
            operation,
            pending: BTreeSet::new(),
        }
    }

    fn validate(&self, request: &Envelope) -> Result<(), ValidationError> {
        self.operation.validate(request)
    }

    fn start(
        &mut self,
        request: &Envelope,
        ctx: &mut OperationContext<'_>,
    ) -> Option<Result<Payload, CommandError>> {
        let step = self.operation.start(request, ctx);
        self.settle(step, ctx).or_else(|| self.stalled(ctx))
    }

    fn handle(
        &mut self,
        event: CommandEvent,
        ctx: &mut OperationContext<'_>,
    ) -> Option<Result<Payload, CommandError>> {
        let step = match event {
            CommandEvent::Reply(reply) => {
                if !self.pending.remove(&reply.correlation_id()) {
                    debug!(
                        target: COMMAND_TARGET,
                        correlation_id = reply.correlation_id().get(),
                        "reply does not belong to this command"
                    );
                    return None;
                }
                self.operation.on_reply(reply, ctx)
            }
            CommandEvent::Notification(notification) => {
                self.operation.on_notification(&notification, ctx)
            }
        };
        self.settle(step, ctx).or_else(|| self.stalled(ctx))
    }

    /// Absorbs newly issued ids and feeds queued transport failures back to
    /// the operation until it either completes or has to wait.
    fn settle(
        &mut self,
        first: Step,
        ctx: &mut OperationContext<'_>,
    ) -> Option<Result<Payload, CommandError>> {
        let mut step = first;
        loop {
            self.pending.extend(ctx.drain_issued());
            if let Step::Complete(result) = step {
                return Some(result);
            }
            let reply = ctx.pop_deferred()?;
            self.pending.remove(&reply.correlation_id());
            step = self.operation.on_reply(reply, ctx);
        }
    }

    /// Result to use when the operation waits with nothing outstanding.
    fn stalled(&self, ctx: &OperationContext<'_>) -> Option<Result<Payload, CommandError>> {
        if !self.pending.is_empty() || ctx.is_subscribed() {
            return None;
        }
        warn!(
            target: COMMAND_TARGET,
            owner = %ctx.handle(),
            "operation waits with no outstanding request or subscription"
        );
        Some(Err(CommandError::failed(
            ResultCode::GenericError,
            "operation stopped without producing a result",
        )))
    }

    fn release(&mut self, ctx: &mut OperationContext<'_>) {
        ctx.release(std::mem::take(&mut self.pending));
    }

    fn pending(&self) -> impl Iterator<Item = CorrelationId> + '_ {
        self.pending.iter().copied()
    }
}
