//! Verb-keyed construction of commands.
//!
//! Plugins register one constructor per `(origin, verb, message type)`. The
//! table is filled while the engine is being built and is read-only
//! afterwards, so lookups need no lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::command::{Command, InboundRequestCommand, Operation, OutboundRequestCommand};
use crate::envelope::{Envelope, MessageType, Origin, VerbId};
use crate::error::EngineError;

const FACTORY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::factory");

/// Builds the operation for one incoming envelope.
pub type OperationBuilder = Arc<dyn Fn(&Envelope) -> Box<dyn Operation> + Send + Sync>;

/// Registered constructor together with the command variant it produces.
#[derive(Clone)]
pub enum CommandConstructor {
    /// Produces an [`OutboundRequestCommand`].
    Outbound(OperationBuilder),
    /// Produces an [`InboundRequestCommand`].
    Inbound(OperationBuilder),
}

impl CommandConstructor {
    /// Wraps an operation builder for application-side requests.
    pub fn outbound<F, O>(build: F) -> Self
    where
        F: Fn(&Envelope) -> O + Send + Sync + 'static,
        O: Operation + 'static,
    {
        Self::Outbound(Arc::new(move |envelope| Box::new(build(envelope))))
    }

    /// Wraps an operation builder for head-unit requests.
    pub fn inbound<F, O>(build: F) -> Self
    where
        F: Fn(&Envelope) -> O + Send + Sync + 'static,
        O: Operation + 'static,
    {
        Self::Inbound(Arc::new(move |envelope| Box::new(build(envelope))))
    }

    fn build(&self, envelope: &Envelope) -> Command {
        match self {
            Self::Outbound(builder) => {
                Command::Outbound(OutboundRequestCommand::new(envelope.clone(), builder(envelope)))
            }
            Self::Inbound(builder) => {
                Command::Inbound(InboundRequestCommand::new(envelope.clone(), builder(envelope)))
            }
        }
    }

    const fn variant(&self) -> &'static str {
        match self {
            Self::Outbound(_) => "outbound",
            Self::Inbound(_) => "inbound",
        }
    }
}

impl fmt::Debug for CommandConstructor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("CommandConstructor")
            .field(&self.variant())
            .finish()
    }
}

/// Lookup key of the factory table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandKey {
    /// Side the triggering envelope comes from.
    pub origin: Origin,
    /// Verb of the triggering envelope.
    pub verb: VerbId,
    /// Message type of the triggering envelope.
    pub message_type: MessageType,
}

impl CommandKey {
    fn of(envelope: &Envelope) -> Self {
        Self {
            origin: envelope.origin(),
            verb: envelope.verb().clone(),
            message_type: envelope.message_type(),
        }
    }
}

/// Table of command constructors.
#[derive(Debug, Clone, Default)]
pub struct CommandFactory {
    constructors: HashMap<CommandKey, CommandConstructor>,
}

impl CommandFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor, replacing any previous one for the same key.
    ///
    /// Returns the replaced constructor.
    pub fn register(
        &mut self,
        origin: Origin,
        verb: impl Into<VerbId>,
        message_type: MessageType,
        constructor: CommandConstructor,
    ) -> Option<CommandConstructor> {
        let key = CommandKey {
            origin,
            verb: verb.into(),
            message_type,
        };
        debug!(
            target: FACTORY_TARGET,
            origin = %key.origin,
            verb = %key.verb,
            message_type = %key.message_type,
            variant = constructor.variant(),
            "registered command"
        );
        let replaced = self.constructors.insert(key.clone(), constructor);
        if replaced.is_some() {
            warn!(
                target: FACTORY_TARGET,
                origin = %key.origin,
                verb = %key.verb,
                message_type = %key.message_type,
                "replaced existing command registration"
            );
        }
        replaced
    }

    /// Builds the command for `envelope`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnsupportedVerb`] when nothing is registered
    /// for the envelope's key.
    pub fn create(&self, envelope: &Envelope) -> Result<Command, EngineError> {
        self.constructors
            .get(&CommandKey::of(envelope))
            .map(|constructor| constructor.build(envelope))
            .ok_or_else(|| {
                EngineError::unsupported_verb(
                    envelope.origin(),
                    envelope.verb(),
                    envelope.message_type(),
                )
            })
    }

    /// Returns `true` when a constructor exists for the key.
    #[must_use]
    pub fn supports(&self, origin: Origin, verb: &VerbId, message_type: MessageType) -> bool {
        self.constructors.contains_key(&CommandKey {
            origin,
            verb: verb.clone(),
            message_type,
        })
    }

    /// Registered keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &CommandKey> {
        self.constructors.keys()
    }

    /// Number of registered constructors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}
