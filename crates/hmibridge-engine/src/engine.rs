//! The engine: shared state tying commands, the correlation registry and
//! the transport together.
//!
//! Every path that resolves an outbound request, whether a reply, a
//! transport failure or an expired deadline, first removes the entry from
//! the [`CorrelationRegistry`]. Only the caller that removed the entry
//! delivers the event, so each request resolves exactly once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::arena::{Arena, CommandHandle};
use crate::clock::{Clock, SystemClock};
use crate::command::{Command, CommandEvent, CompletionCallback, OperationContext, Reply};
use crate::correlation::CorrelationRegistry;
use crate::envelope::{CorrelationId, Envelope, MessageType, Origin, VerbId};
use crate::error::{CommandError, EngineError, TransportError};
use crate::factory::{CommandConstructor, CommandFactory};
use crate::plugin::{PluginRegistry, RpcPlugin};
use crate::session::SessionId;
use crate::subscriptions::SubscriptionTable;
use crate::timeout::TimeoutPolicy;
use crate::transport::Transport;

const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

/// A command together with the bookkeeping the engine keeps for it.
pub(crate) struct LiveCommand {
    command: Command,
    session: SessionId,
    completion: Option<CompletionCallback>,
    discarded: bool,
}

type SharedCommand = Arc<Mutex<LiveCommand>>;

fn lock_command(command: &SharedCommand) -> MutexGuard<'_, LiveCommand> {
    command.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct EngineCore {
    pub(crate) factory: CommandFactory,
    pub(crate) registry: CorrelationRegistry,
    pub(crate) commands: Arena<SharedCommand>,
    pub(crate) subscriptions: SubscriptionTable,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) timeouts: TimeoutPolicy,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Assembles an [`Engine`].
///
/// The command factory is only mutable here; once built, the engine's
/// factory is read-only.
pub struct EngineBuilder {
    transport: Arc<dyn Transport>,
    factory: CommandFactory,
    plugins: PluginRegistry,
    timeouts: TimeoutPolicy,
    clock: Arc<dyn Clock>,
    first_id: Option<CorrelationId>,
}

impl EngineBuilder {
    /// Adds a plugin whose commands are installed by [`EngineBuilder::build`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicatePlugin`] when the name is taken.
    pub fn plugin(mut self, plugin: Arc<dyn RpcPlugin>) -> Result<Self, EngineError> {
        self.plugins.register(plugin)?;
        Ok(self)
    }

    /// Registers a single command directly.
    #[must_use]
    pub fn command(
        mut self,
        origin: Origin,
        verb: impl Into<VerbId>,
        message_type: MessageType,
        constructor: CommandConstructor,
    ) -> Self {
        self.factory
            .register(origin, verb, message_type, constructor);
        self
    }

    /// Replaces the deadline policy.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Makes `first` the first correlation id the engine allocates.
    #[must_use]
    pub fn first_correlation_id(mut self, first: CorrelationId) -> Self {
        self.first_id = Some(first);
        self
    }

    /// Installs the plugins and freezes the factory.
    #[must_use]
    pub fn build(self) -> Engine {
        let Self {
            transport,
            mut factory,
            plugins,
            timeouts,
            clock,
            first_id,
        } = self;
        plugins.install(&mut factory);
        info!(
            target: ENGINE_TARGET,
            plugins = ?plugins.names(),
            commands = factory.len(),
            transport = transport.name(),
            "engine ready"
        );
        Engine {
            core: Arc::new(EngineCore {
                factory,
                registry: first_id
                    .map_or_else(CorrelationRegistry::new, CorrelationRegistry::starting_at),
                commands: Arena::default(),
                subscriptions: SubscriptionTable::default(),
                transport,
                timeouts,
                clock,
            }),
        }
    }
}

/// Cheaply cloneable handle to the shared engine state.
#[derive(Clone)]
pub struct Engine {
    core: Arc<EngineCore>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Engine")
            .field("transport", &self.core.transport.name())
            .field("commands", &self.core.commands.len())
            .field("pending", &self.core.registry.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Starts assembling an engine that sends through `transport`.
    #[must_use]
    pub fn builder(transport: Arc<dyn Transport>) -> EngineBuilder {
        EngineBuilder {
            transport,
            factory: CommandFactory::new(),
            plugins: PluginRegistry::new(),
            timeouts: TimeoutPolicy::default(),
            clock: Arc::new(SystemClock),
            first_id: None,
        }
    }

    /// Creates, validates and runs the command for `request`.
    ///
    /// The completion callback receives the result of outbound commands once
    /// every one of their requests has resolved. Inbound commands answer
    /// through the transport instead; a callback passed for them is still
    /// invoked with the same result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedVerb`] when no command handles the
    /// request and [`EngineError::Validation`] when its parameters are
    /// rejected. Nothing is sent in either case.
    pub fn submit(
        &self,
        session: SessionId,
        request: &Envelope,
        completion: Option<CompletionCallback>,
    ) -> Result<CommandHandle, EngineError> {
        let mut command = self.core.factory.create(request)?;
        if let Err(source) = command.init() {
            debug!(
                target: ENGINE_TARGET,
                verb = %request.verb(),
                error = %source,
                "command rejected its parameters"
            );
            return Err(EngineError::validation(request.verb(), source));
        }

        let shared = Arc::new(Mutex::new(LiveCommand {
            command,
            session,
            completion,
            discarded: false,
        }));
        // Hold the command lock across insertion and `run` so a reply racing
        // in on another thread waits until `run` has returned.
        let mut live = lock_command(&shared);
        let handle = self.core.commands.insert(session, Arc::clone(&shared));
        debug!(
            target: ENGINE_TARGET,
            verb = %request.verb(),
            session = %session,
            handle = %handle,
            "running command"
        );
        let mut ctx = OperationContext::new(&self.core, handle, session, request.origin());
        live.command.run(&mut ctx);
        self.finish_if_terminal(handle, &mut live);
        Ok(handle)
    }

    /// Delivers a response or error envelope to the command awaiting `id`.
    ///
    /// Returns `false` when `id` is not outstanding, for example because it
    /// already timed out or its session ended, and when the reply comes from
    /// the wrong side or names another verb. A mismatched reply leaves the
    /// request pending.
    pub fn resolve(&self, id: CorrelationId, envelope: Envelope) -> bool {
        let entry = match self
            .core
            .registry
            .take_reply(id, envelope.origin(), envelope.verb())
        {
            Ok(entry) => entry,
            Err(mismatch) => {
                debug!(
                    target: ENGINE_TARGET,
                    correlation_id = id.get(),
                    verb = %envelope.verb(),
                    origin = %envelope.origin(),
                    reason = %mismatch,
                    "reply does not match a pending request"
                );
                return false;
            }
        };
        let reply = Reply::from_envelope(id, entry.verb().clone(), envelope);
        self.deliver(entry.owner(), CommandEvent::Reply(reply));
        true
    }

    /// Expires every request whose deadline is at or before `now`.
    ///
    /// Returns the number of requests that timed out.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired = self.core.registry.sweep(now);
        let count = expired.len();
        for (id, entry) in expired {
            warn!(
                target: ENGINE_TARGET,
                correlation_id = id.get(),
                verb = %entry.verb(),
                session = %entry.session(),
                "request timed out"
            );
            let error = CommandError::Timeout {
                verb: entry.verb().clone(),
                correlation_id: id,
            };
            let reply = Reply::failure(id, entry.verb().clone(), error);
            self.deliver(entry.owner(), CommandEvent::Reply(reply));
        }
        count
    }

    /// Routes a notification to every subscribed command.
    ///
    /// Returns the number of commands that received it.
    pub fn notify(&self, notification: &Envelope) -> usize {
        self.core
            .subscriptions
            .subscribers(notification.verb())
            .into_iter()
            .filter(|owner| {
                self.deliver(*owner, CommandEvent::Notification(notification.clone()))
            })
            .count()
    }

    /// Withdraws one outstanding request without notifying its owner.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        self.core.registry.cancel(id)
    }

    /// Ends a session: drops its outstanding requests, commands and
    /// subscriptions without invoking any of them.
    ///
    /// Returns the cancelled correlation ids.
    pub fn end_session(&self, session: SessionId) -> Vec<CorrelationId> {
        let cancelled = self.core.registry.cancel_session(session);
        let handles = self.core.commands.handles_for_session(session);
        for handle in &handles {
            self.discard(*handle);
        }
        info!(
            target: ENGINE_TARGET,
            session = %session,
            cancelled = cancelled.len(),
            commands = handles.len(),
            "session ended"
        );
        cancelled
    }

    /// Ends every session.
    ///
    /// Returns the number of cancelled requests.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.core.registry.cancel_all();
        for handle in self.core.commands.handles() {
            self.discard(handle);
        }
        self.core.subscriptions.clear();
        info!(
            target: ENGINE_TARGET,
            cancelled = cancelled.len(),
            "engine shut down"
        );
        cancelled.len()
    }

    /// Returns `true` when `id` awaits a reply.
    #[must_use]
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.core.registry.contains(id)
    }

    /// Number of requests awaiting a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.core.registry.len()
    }

    /// Number of commands that have not finished.
    #[must_use]
    pub fn live_commands(&self) -> usize {
        self.core.commands.len()
    }

    /// Returns `true` when a command handles the key.
    #[must_use]
    pub fn supports(&self, origin: Origin, verb: &VerbId, message_type: MessageType) -> bool {
        self.core.factory.supports(origin, verb, message_type)
    }

    /// Current instant according to the engine clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.core.clock.now()
    }

    /// Sends an envelope that belongs to no command, such as an error reply
    /// to a rejected request.
    ///
    /// # Errors
    ///
    /// Returns the transport's error.
    pub fn send_raw(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.core.transport.send(envelope)
    }

    fn deliver(&self, owner: CommandHandle, event: CommandEvent) -> bool {
        let Some(shared) = self.core.commands.get(owner) else {
            debug!(
                target: ENGINE_TARGET,
                owner = %owner,
                "event for a command that no longer exists"
            );
            return false;
        };
        let mut live = lock_command(&shared);
        if live.discarded || live.command.is_terminal() {
            return false;
        }
        let origin = live.command.request().origin();
        let mut ctx = OperationContext::new(&self.core, owner, live.session, origin);
        live.command.on_event(event, &mut ctx);
        self.finish_if_terminal(owner, &mut live);
        true
    }

    fn finish_if_terminal(&self, handle: CommandHandle, live: &mut LiveCommand) {
        if !live.command.is_terminal() {
            return;
        }
        self.core.commands.remove(handle);
        let Some(outcome) = live.command.take_outcome() else {
            return;
        };
        if let Some(completion) = live.completion.take() {
            completion(outcome);
        }
    }

    fn discard(&self, handle: CommandHandle) {
        self.core.subscriptions.remove_owner(handle);
        if let Some(shared) = self.core.commands.remove(handle) {
            let mut live = lock_command(&shared);
            live.discarded = true;
            live.completion = None;
            self.core.registry.cancel_owner(handle);
        }
    }
}
