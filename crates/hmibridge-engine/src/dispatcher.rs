//! Classification and routing of inbound envelopes.
//!
//! Links push decoded envelopes into an [`InboundQueue`] through a
//! per-connection [`ConnectionSender`]. A single dispatcher thread drains the
//! queue, so envelopes from one connection are handled in arrival order.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::CompletionCallback;
use crate::engine::Engine;
use crate::envelope::{CorrelationId, Envelope, MessageType, Origin};
use crate::error::{EngineError, ErrorKind, TransportError};
use crate::session::SessionId;
use crate::transport::Transport;
use crate::worker::{StopSignal, WorkerError, WorkerHandle};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
const WORKER_NAME: &str = "hmibridge-dispatch";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One envelope tagged with the connection it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Session of the connection.
    pub session: SessionId,
    /// Decoded envelope.
    pub envelope: Envelope,
}

/// Producer side of the inbound queue.
#[derive(Debug, Clone)]
pub struct InboundQueue {
    sender: Sender<Inbound>,
}

/// Consumer side of the inbound queue.
#[derive(Debug)]
pub struct InboundReceiver {
    receiver: Receiver<Inbound>,
}

impl InboundQueue {
    /// Creates a queue and its receiver.
    #[must_use]
    pub fn channel() -> (Self, InboundReceiver) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, InboundReceiver { receiver })
    }

    /// Sender bound to one connection.
    #[must_use]
    pub fn connection(&self, session: SessionId) -> ConnectionSender {
        ConnectionSender {
            session,
            sender: self.sender.clone(),
        }
    }
}

impl InboundReceiver {
    /// Waits up to `timeout` for the next envelope.
    ///
    /// # Errors
    ///
    /// Returns [`RecvTimeoutError`] on timeout or when every sender is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Inbound, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Returns the next envelope if one is queued.
    #[must_use]
    pub fn try_recv(&self) -> Option<Inbound> {
        self.receiver.try_recv().ok()
    }
}

/// Inbound queue handle of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    session: SessionId,
    sender: Sender<Inbound>,
}

impl ConnectionSender {
    /// Queues an envelope received on this connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the dispatcher has stopped.
    pub fn deliver(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.sender
            .send(Inbound {
                session: self.session,
                envelope,
            })
            .map_err(|_| TransportError::closed("inbound-queue"))
    }

    /// Session of the connection.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }
}

/// How an envelope was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A reply resolved the pending request with this id.
    Resolved(CorrelationId),
    /// A reply matched no pending request and was dropped.
    Mismatched(Option<CorrelationId>),
    /// A request was handed to a new command.
    Executed,
    /// A request was refused and answered with an error envelope.
    Rejected(ErrorKind),
    /// A notification reached this many subscribers.
    Notified(usize),
}

/// Routes inbound envelopes by message type.
#[derive(Clone)]
pub struct EventDispatcher {
    engine: Engine,
    application_link: Option<Arc<dyn Transport>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EventDispatcher")
            .field("engine", &self.engine)
            .field(
                "application_link",
                &self.application_link.as_ref().map(|link| link.name()),
            )
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher feeding `engine`.
    #[must_use]
    pub const fn new(engine: Engine) -> Self {
        Self {
            engine,
            application_link: None,
        }
    }

    /// Answers application-side requests through `link` once their commands
    /// finish.
    ///
    /// Without a link, results of application-side requests are only logged.
    #[must_use]
    pub fn with_application_link(mut self, link: Arc<dyn Transport>) -> Self {
        self.application_link = Some(link);
        self
    }

    /// Handles one envelope received on `session`.
    pub fn dispatch(&self, session: SessionId, envelope: Envelope) -> Dispatched {
        match envelope.message_type() {
            MessageType::Response | MessageType::Error => self.resolve(envelope),
            MessageType::Request => self.execute(session, &envelope),
            MessageType::Notification => Dispatched::Notified(self.engine.notify(&envelope)),
        }
    }

    fn resolve(&self, envelope: Envelope) -> Dispatched {
        let Some(id) = envelope.correlation_id() else {
            warn!(
                target: DISPATCH_TARGET,
                verb = %envelope.verb(),
                "reply without correlation id"
            );
            return Dispatched::Mismatched(None);
        };
        if self.engine.resolve(id, envelope) {
            Dispatched::Resolved(id)
        } else {
            debug!(
                target: DISPATCH_TARGET,
                correlation_id = id.get(),
                kind = %ErrorKind::ProtocolMismatch,
                "dropping stale reply"
            );
            Dispatched::Mismatched(Some(id))
        }
    }

    fn execute(&self, session: SessionId, request: &Envelope) -> Dispatched {
        let completion = self.application_reply(request);
        match self.engine.submit(session, request, completion) {
            Ok(_) => Dispatched::Executed,
            Err(error) => self.reject(request, &error),
        }
    }

    fn reject(&self, request: &Envelope, error: &EngineError) -> Dispatched {
        let kind = error.kind().unwrap_or(ErrorKind::ProtocolMismatch);
        warn!(
            target: DISPATCH_TARGET,
            verb = %request.verb(),
            kind = %kind,
            error = %error,
            "rejecting request"
        );
        let reply = request.error_to(error.result_code(), error.to_string());
        let sent = match (&self.application_link, request.origin()) {
            (Some(link), Origin::FromApplication) => link.send(&reply),
            _ => self.engine.send_raw(&reply),
        };
        if let Err(send_error) = sent {
            warn!(
                target: DISPATCH_TARGET,
                verb = %request.verb(),
                error = %send_error,
                "could not send rejection"
            );
        }
        Dispatched::Rejected(kind)
    }

    fn application_reply(&self, request: &Envelope) -> Option<CompletionCallback> {
        if request.origin() != Origin::FromApplication {
            return None;
        }
        let link = Arc::clone(self.application_link.as_ref()?);
        let answered = request.clone();
        Some(Box::new(move |outcome| {
            let reply = match outcome.result {
                Ok(payload) => answered.response_to(payload),
                Err(error) => answered.error_to(error.result_code(), error.to_string()),
            };
            if let Err(error) = link.send(&reply) {
                warn!(
                    target: DISPATCH_TARGET,
                    verb = %answered.verb(),
                    error = %error,
                    "could not answer application request"
                );
            }
        }))
    }

    /// Drains `inbound` until `stop` is raised or every sender is dropped.
    pub fn run(&self, inbound: &InboundReceiver, stop: &StopSignal) {
        info!(target: DISPATCH_TARGET, "dispatcher started");
        while !stop.is_raised() {
            match inbound.recv_timeout(POLL_INTERVAL) {
                Ok(Inbound { session, envelope }) => {
                    self.dispatch(session, envelope);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!(target: DISPATCH_TARGET, "dispatcher stopped");
    }

    /// Starts [`EventDispatcher::run`] on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] when the thread cannot be created.
    pub fn spawn(
        self,
        inbound: InboundReceiver,
        stop: StopSignal,
    ) -> Result<WorkerHandle, WorkerError> {
        WorkerHandle::spawn(WORKER_NAME, stop, move |signal| self.run(&inbound, &signal))
    }
}
