//! Commands serving application-side requests.

use tracing::{debug, info, warn};

use super::{COMMAND_TARGET, CommandEvent, Operation, OperationContext, Progress};
use crate::envelope::{CorrelationId, Envelope, Payload};
use crate::error::{CommandError, ValidationError};

/// Lifecycle of an [`OutboundRequestCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundState {
    /// Built by the factory.
    Created,
    /// Parameters validated.
    Initialized,
    /// Operation started and its requests handed to the transport.
    Sent,
    /// Waiting for replies or notifications.
    AwaitingReply,
    /// Result delivered to the completion callback.
    Resolved,
}

/// Command that issues requests towards the head unit and reports a result
/// once every one of them has resolved.
pub struct OutboundRequestCommand {
    request: Envelope,
    progress: Progress,
    state: OutboundState,
    result: Option<Result<Payload, CommandError>>,
}

impl OutboundRequestCommand {
    /// Wraps `operation` for the given request.
    #[must_use]
    pub fn new(request: Envelope, operation: Box<dyn Operation>) -> Self {
        Self {
            request,
            progress: Progress::new(operation),
            state: OutboundState::Created,
            result: None,
        }
    }

    pub(super) fn init(&mut self) -> Result<(), ValidationError> {
        if self.state != OutboundState::Created {
            return Ok(());
        }
        self.progress.validate(&self.request)?;
        self.state = OutboundState::Initialized;
        Ok(())
    }

    pub(super) fn run(&mut self, ctx: &mut OperationContext<'_>) {
        if self.state != OutboundState::Initialized {
            warn!(
                target: COMMAND_TARGET,
                verb = %self.request.verb(),
                state = ?self.state,
                "run called out of order"
            );
            return;
        }
        let finished = self.progress.start(&self.request, ctx);
        self.state = OutboundState::Sent;
        match finished {
            Some(result) => self.resolve(result, ctx),
            None => {
                debug!(
                    target: COMMAND_TARGET,
                    verb = %self.request.verb(),
                    pending = ?self.pending(),
                    "awaiting replies"
                );
                self.state = OutboundState::AwaitingReply;
            }
        }
    }

    pub(super) fn on_event(&mut self, event: CommandEvent, ctx: &mut OperationContext<'_>) {
        if self.state != OutboundState::AwaitingReply {
            debug!(
                target: COMMAND_TARGET,
                verb = %self.request.verb(),
                state = ?self.state,
                "dropping event for inactive command"
            );
            return;
        }
        if let Some(result) = self.progress.handle(event, ctx) {
            self.resolve(result, ctx);
        }
    }

    fn resolve(&mut self, result: Result<Payload, CommandError>, ctx: &mut OperationContext<'_>) {
        self.progress.release(ctx);
        match &result {
            Ok(_) => info!(
                target: COMMAND_TARGET,
                verb = %self.request.verb(),
                session = %ctx.session(),
                "outbound command resolved"
            ),
            Err(error) => warn!(
                target: COMMAND_TARGET,
                verb = %self.request.verb(),
                session = %ctx.session(),
                error = %error,
                "outbound command failed"
            ),
        }
        self.state = OutboundState::Resolved;
        self.result = Some(result);
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> OutboundState {
        self.state
    }

    /// Request that created the command.
    #[must_use]
    pub const fn request(&self) -> &Envelope {
        &self.request
    }

    /// Correlation ids still awaiting a reply.
    #[must_use]
    pub fn pending(&self) -> Vec<CorrelationId> {
        self.progress.pending().collect()
    }

    pub(super) fn take_result(&mut self) -> Option<Result<Payload, CommandError>> {
        self.result.take()
    }
}
