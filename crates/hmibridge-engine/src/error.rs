//! Error taxonomy of the dispatch engine.
//!
//! [`EngineError`] is reported synchronously to whoever creates or submits a
//! command. [`CommandError`] travels asynchronously through a command's event
//! path so that replies, transport failures and timeouts all resume the
//! command the same way.

use std::fmt;

use thiserror::Error;

use crate::envelope::{CorrelationId, MessageType, Origin, ResultCode, VerbId};

/// Error kinds distinguished by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing parameters, detected before anything is sent.
    Validation,
    /// No command is registered for the verb.
    UnsupportedVerb,
    /// The transport refused an outbound envelope.
    Transport,
    /// No reply arrived before the deadline.
    Timeout,
    /// A reply named a correlation id the registry no longer tracks.
    ProtocolMismatch,
    /// The owning session ended before resolution.
    Cancelled,
}

impl ErrorKind {
    /// Result code reported to a peer for this kind of failure.
    #[must_use]
    pub const fn result_code(self) -> ResultCode {
        match self {
            Self::Validation => ResultCode::InvalidData,
            Self::UnsupportedVerb => ResultCode::UnsupportedRequest,
            Self::Transport | Self::ProtocolMismatch => ResultCode::GenericError,
            Self::Timeout => ResultCode::TimedOut,
            Self::Cancelled => ResultCode::Aborted,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::UnsupportedVerb => "unsupported_verb",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::Cancelled => "cancelled",
        };
        formatter.write_str(label)
    }
}

/// Parameter validation failures raised by `init`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A mandatory parameter is absent.
    #[error("missing mandatory parameter '{name}'")]
    MissingParameter {
        /// Parameter name.
        name: String,
    },
    /// A parameter is present with the wrong shape.
    #[error("parameter '{name}' must be {expected}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Description of the accepted shape.
        expected: &'static str,
    },
}

impl ValidationError {
    /// Creates a missing parameter error.
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Creates an invalid parameter error.
    pub fn invalid(name: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            expected,
        }
    }
}

/// Failures reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport refused the envelope.
    #[error("transport '{transport}' rejected the envelope: {message}")]
    Rejected {
        /// Transport name.
        transport: String,
        /// Failure description.
        message: String,
    },
    /// The link is gone.
    #[error("transport '{transport}' is closed")]
    Closed {
        /// Transport name.
        transport: String,
    },
}

impl TransportError {
    /// Creates a rejection error.
    pub fn rejected(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Creates a closed-link error.
    pub fn closed(transport: impl Into<String>) -> Self {
        Self::Closed {
            transport: transport.into(),
        }
    }
}

/// Failure delivered to, or produced by, a running command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Parameters failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// An outbound request could not be sent.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// No reply arrived in time.
    #[error("no reply to '{verb}' (correlation id {correlation_id}) before the deadline")]
    Timeout {
        /// Verb of the expired request.
        verb: VerbId,
        /// Correlation id of the expired request.
        correlation_id: CorrelationId,
    },
    /// The operation was abandoned.
    #[error("operation cancelled")]
    Cancelled,
    /// The peer answered with an error envelope.
    #[error("peer rejected '{verb}' with {code}: {info}")]
    Rejected {
        /// Verb of the rejected request.
        verb: VerbId,
        /// Result code supplied by the peer.
        code: ResultCode,
        /// Detail supplied by the peer.
        info: String,
    },
    /// The operation failed for a business reason.
    #[error("{code}: {info}")]
    Failed {
        /// Result code to report.
        code: ResultCode,
        /// Failure description.
        info: String,
    },
}

impl CommandError {
    /// Creates a business failure.
    pub fn failed(code: ResultCode, info: impl Into<String>) -> Self {
        Self::Failed {
            code,
            info: info.into(),
        }
    }

    /// Engine error kind, when the failure belongs to the engine taxonomy.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Validation(_) => Some(ErrorKind::Validation),
            Self::Transport(_) => Some(ErrorKind::Transport),
            Self::Timeout { .. } => Some(ErrorKind::Timeout),
            Self::Cancelled => Some(ErrorKind::Cancelled),
            Self::Rejected { .. } | Self::Failed { .. } => None,
        }
    }

    /// Result code reported to a peer for this failure.
    #[must_use]
    pub const fn result_code(&self) -> ResultCode {
        match self {
            Self::Rejected { code, .. } | Self::Failed { code, .. } => *code,
            other => match other.kind() {
                Some(kind) => kind.result_code(),
                None => ResultCode::GenericError,
            },
        }
    }
}

/// Errors reported synchronously by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The command rejected its parameters during `init`.
    #[error("invalid '{verb}' request: {source}")]
    Validation {
        /// Verb of the rejected command.
        verb: VerbId,
        /// Validation failure.
        #[source]
        source: ValidationError,
    },

    /// No command is registered for the envelope.
    #[error("no command registered for {message_type} '{verb}' {origin}")]
    UnsupportedVerb {
        /// Origin of the unsupported message.
        origin: Origin,
        /// Verb of the unsupported message.
        verb: VerbId,
        /// Message type of the unsupported message.
        message_type: MessageType,
    },

    /// Two plugins share a name.
    #[error("plugin '{name}' is already registered")]
    DuplicatePlugin {
        /// Plugin name.
        name: String,
    },

    /// Every correlation id is in use.
    #[error("no free correlation id: {live} requests in flight")]
    CorrelationExhausted {
        /// Number of live entries.
        live: usize,
    },
}

impl EngineError {
    /// Creates a validation error.
    pub fn validation(verb: &VerbId, source: ValidationError) -> Self {
        Self::Validation {
            verb: verb.clone(),
            source,
        }
    }

    /// Creates an unsupported verb error.
    pub fn unsupported_verb(origin: Origin, verb: &VerbId, message_type: MessageType) -> Self {
        Self::UnsupportedVerb {
            origin,
            verb: verb.clone(),
            message_type,
        }
    }

    /// Creates a duplicate plugin error.
    pub fn duplicate_plugin(name: impl Into<String>) -> Self {
        Self::DuplicatePlugin { name: name.into() }
    }

    /// Engine error kind, when the failure belongs to the engine taxonomy.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Validation { .. } => Some(ErrorKind::Validation),
            Self::UnsupportedVerb { .. } => Some(ErrorKind::UnsupportedVerb),
            Self::DuplicatePlugin { .. } | Self::CorrelationExhausted { .. } => None,
        }
    }

    /// Result code reported to the originator of a rejected request.
    #[must_use]
    pub const fn result_code(&self) -> ResultCode {
        match self.kind() {
            Some(kind) => kind.result_code(),
            None => ResultCode::GenericError,
        }
    }
}
