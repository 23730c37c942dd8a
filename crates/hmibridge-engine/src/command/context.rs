//! Services a running operation may use.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, warn};

use crate::arena::CommandHandle;
use crate::command::Reply;
use crate::engine::EngineCore;
use crate::envelope::{CorrelationId, Envelope, Origin, Payload, VerbId};
use crate::error::{CommandError, EngineError, TransportError};
use crate::session::SessionId;

const CONTEXT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::command");

/// Handle through which an [`Operation`](crate::Operation) issues requests
/// and subscriptions on behalf of its command.
pub struct OperationContext<'a> {
    core: &'a EngineCore,
    handle: CommandHandle,
    session: SessionId,
    origin: Origin,
    issued: Vec<CorrelationId>,
    deferred: VecDeque<Reply>,
}

impl<'a> OperationContext<'a> {
    pub(crate) const fn new(
        core: &'a EngineCore,
        handle: CommandHandle,
        session: SessionId,
        origin: Origin,
    ) -> Self {
        Self {
            core,
            handle,
            session,
            origin,
            issued: Vec::new(),
            deferred: VecDeque::new(),
        }
    }

    /// Sends an outbound request and returns its correlation id.
    ///
    /// The pending entry is registered before the envelope reaches the
    /// transport, so a reply can never arrive for an unknown id. When the
    /// transport refuses the envelope, the entry is withdrawn and a
    /// [`CommandError::Transport`] reply is queued for the operation; it is
    /// delivered once the current callback returns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CorrelationExhausted`] when no id is free.
    pub fn send(
        &mut self,
        verb: impl Into<VerbId>,
        payload: Payload,
    ) -> Result<CorrelationId, EngineError> {
        let verb_id = verb.into();
        let deadline =
            self.core.clock.now() + self.core.timeouts.timeout_for(self.origin, &verb_id);
        let sent_from = Origin::FromApplication;
        let id = self.core.registry.register(
            self.handle,
            self.session,
            verb_id.clone(),
            sent_from.opposite(),
            deadline,
        )?;
        let envelope = Envelope::request(sent_from, verb_id, id, payload);
        self.issued.push(id);

        match self.core.transport.send(&envelope) {
            Ok(()) => {
                debug!(
                    target: CONTEXT_TARGET,
                    correlation_id = id.get(),
                    verb = %envelope.verb(),
                    owner = %self.handle,
                    "sent outbound request"
                );
            }
            Err(error) => {
                warn!(
                    target: CONTEXT_TARGET,
                    correlation_id = id.get(),
                    verb = %envelope.verb(),
                    error = %error,
                    "transport refused outbound request"
                );
                if let Some(entry) = self.core.registry.take(id) {
                    self.deferred.push_back(Reply::failure(
                        id,
                        entry.verb().clone(),
                        CommandError::Transport(error),
                    ));
                }
            }
        }
        Ok(id)
    }

    /// Routes notifications named `verb` to this command until it finishes.
    pub fn subscribe(&mut self, verb: impl Into<VerbId>) {
        self.core.subscriptions.subscribe(verb.into(), self.handle);
    }

    /// Stops routing notifications named `verb` to this command.
    pub fn unsubscribe(&mut self, verb: &VerbId) {
        self.core.subscriptions.unsubscribe(verb, self.handle);
    }

    /// Handle of the command being driven.
    #[must_use]
    pub const fn handle(&self) -> CommandHandle {
        self.handle
    }

    /// Session owning the command.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Origin of the request that created the command.
    #[must_use]
    pub const fn origin(&self) -> Origin {
        self.origin
    }

    /// Current instant according to the engine clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.core.clock.now()
    }

    pub(crate) fn drain_issued(&mut self) -> Vec<CorrelationId> {
        std::mem::take(&mut self.issued)
    }

    pub(crate) fn pop_deferred(&mut self) -> Option<Reply> {
        self.deferred.pop_front()
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.core.subscriptions.is_subscribed(self.handle)
    }

    /// Withdraws every outstanding id and subscription of the command.
    pub(crate) fn release(&mut self, pending: impl IntoIterator<Item = CorrelationId>) {
        for id in pending {
            self.core.registry.cancel(id);
        }
        self.deferred.clear();
        self.core.subscriptions.remove_owner(self.handle);
    }

    pub(crate) fn reply_to_peer(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.core.transport.send(envelope)
    }
}
