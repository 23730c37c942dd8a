//! Commands serving requests initiated by the head unit.

use tracing::{debug, info, warn};

use super::{COMMAND_TARGET, CommandEvent, Operation, OperationContext, Progress};
use crate::envelope::{Envelope, Payload};
use crate::error::{CommandError, ValidationError};

/// Lifecycle of an [`InboundRequestCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundState {
    /// Built by the factory.
    Created,
    /// Parameters validated.
    Initialized,
    /// Operation started, possibly waiting on its own requests.
    Executed,
    /// Response or error envelope sent back.
    Replied,
}

/// Command answering one head-unit request with exactly one reply.
pub struct InboundRequestCommand {
    request: Envelope,
    progress: Progress,
    state: InboundState,
    result: Option<Result<Payload, CommandError>>,
}

impl InboundRequestCommand {
    /// Wraps `operation` for the given request.
    #[must_use]
    pub fn new(request: Envelope, operation: Box<dyn Operation>) -> Self {
        Self {
            request,
            progress: Progress::new(operation),
            state: InboundState::Created,
            result: None,
        }
    }

    pub(super) fn init(&mut self) -> Result<(), ValidationError> {
        if self.state != InboundState::Created {
            return Ok(());
        }
        self.progress.validate(&self.request)?;
        self.state = InboundState::Initialized;
        Ok(())
    }

    pub(super) fn run(&mut self, ctx: &mut OperationContext<'_>) {
        if self.state != InboundState::Initialized {
            warn!(
                target: COMMAND_TARGET,
                verb = %self.request.verb(),
                state = ?self.state,
                "run called out of order"
            );
            return;
        }
        let finished = self.progress.start(&self.request, ctx);
        self.state = InboundState::Executed;
        if let Some(result) = finished {
            self.reply(result, ctx);
        }
    }

    pub(super) fn on_event(&mut self, event: CommandEvent, ctx: &mut OperationContext<'_>) {
        if self.state != InboundState::Executed {
            debug!(
                target: COMMAND_TARGET,
                verb = %self.request.verb(),
                state = ?self.state,
                "dropping event for inactive command"
            );
            return;
        }
        if let Some(result) = self.progress.handle(event, ctx) {
            self.reply(result, ctx);
        }
    }

    fn reply(&mut self, result: Result<Payload, CommandError>, ctx: &mut OperationContext<'_>) {
        self.progress.release(ctx);
        let envelope = match &result {
            Ok(payload) => self.request.response_to(payload.clone()),
            Err(error) => self.request.error_to(error.result_code(), error.to_string()),
        };
        match ctx.reply_to_peer(&envelope) {
            Ok(()) => info!(
                target: COMMAND_TARGET,
                verb = %self.request.verb(),
                correlation_id = ?self.request.correlation_id().map(|id| id.get()),
                reply = %envelope.message_type(),
                "answered inbound request"
            ),
            Err(error) => warn!(
                target: COMMAND_TARGET,
                verb = %self.request.verb(),
                error = %error,
                "could not send reply to inbound request"
            ),
        }
        self.state = InboundState::Replied;
        self.result = Some(result);
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> InboundState {
        self.state
    }

    /// Request that created the command.
    #[must_use]
    pub const fn request(&self) -> &Envelope {
        &self.request
    }

    pub(super) fn take_result(&mut self) -> Option<Result<Payload, CommandError>> {
        self.result.take()
    }
}
