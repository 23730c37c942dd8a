//! Canonical in-memory representation of one protocol message.
//!
//! An [`Envelope`] is immutable once built. Replies are derived from the
//! request they answer with [`Envelope::response_to`] and
//! [`Envelope::error_to`], which copy the request's correlation id and verb
//! so the pairing invariant holds by construction.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Opaque structured key/value document carried by an envelope.
pub type Payload = serde_json::Map<String, Value>;

/// Payload key holding the [`ResultCode`] of an error envelope.
pub const CODE_KEY: &str = "code";
/// Payload key holding the human-readable detail of an error envelope.
pub const INFO_KEY: &str = "info";

/// Identifier linking an outbound request to its eventual reply.
///
/// The raw value `0` is reserved for "no correlation" and never wraps a
/// `CorrelationId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(u32);

impl CorrelationId {
    /// Wraps a raw identifier, returning `None` for the reserved value `0`.
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Name of the RPC operation an envelope represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerbId(String);

impl VerbId {
    /// Creates a verb identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the verb name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for VerbId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for VerbId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VerbId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Protocol role of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Asks the peer to perform an operation.
    Request,
    /// Successful answer to a request.
    Response,
    /// Unsolicited message, never correlated.
    Notification,
    /// Failed answer to a request.
    Error,
}

impl MessageType {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Notification => "notification",
            Self::Error => "error",
        }
    }

    /// Returns `true` for responses and errors.
    #[must_use]
    pub const fn is_reply(self) -> bool {
        matches!(self, Self::Response | Self::Error)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Side of the bridge a message comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A client application, or the bridge acting on its behalf.
    FromApplication,
    /// The head unit.
    FromHmi,
}

impl Origin {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FromApplication => "from_application",
            Self::FromHmi => "from_hmi",
        }
    }

    /// Returns the origin of a reply to a message from `self`.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::FromApplication => Self::FromHmi,
            Self::FromHmi => Self::FromApplication,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Result codes carried by error envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    /// The operation succeeded.
    Success,
    /// Parameters were missing or ill-typed.
    InvalidData,
    /// No command handles the verb.
    UnsupportedRequest,
    /// Unclassified failure.
    GenericError,
    /// No reply arrived within the deadline.
    TimedOut,
    /// The operation was abandoned.
    Aborted,
    /// The peer refused the operation.
    Rejected,
}

impl ResultCode {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::InvalidData => "INVALID_DATA",
            Self::UnsupportedRequest => "UNSUPPORTED_REQUEST",
            Self::GenericError => "GENERIC_ERROR",
            Self::TimedOut => "TIMED_OUT",
            Self::Aborted => "ABORTED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_correlation_id"
    )]
    correlation_id: Option<CorrelationId>,
    verb: VerbId,
    message_type: MessageType,
    origin: Origin,
    #[serde(default)]
    payload: Payload,
}

fn deserialize_correlation_id<'de, D>(deserializer: D) -> Result<Option<CorrelationId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<u32>::deserialize(deserializer)?;
    Ok(raw.and_then(CorrelationId::new))
}

impl Envelope {
    /// Builds a request.
    #[must_use]
    pub fn request(
        origin: Origin,
        verb: impl Into<VerbId>,
        correlation_id: CorrelationId,
        payload: Payload,
    ) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            verb: verb.into(),
            message_type: MessageType::Request,
            origin,
            payload,
        }
    }

    /// Builds a notification. Notifications never carry a correlation id.
    #[must_use]
    pub fn notification(origin: Origin, verb: impl Into<VerbId>, payload: Payload) -> Self {
        Self {
            correlation_id: None,
            verb: verb.into(),
            message_type: MessageType::Notification,
            origin,
            payload,
        }
    }

    /// Builds a successful response answering `self`.
    #[must_use]
    pub fn response_to(&self, payload: Payload) -> Self {
        Self {
            correlation_id: self.correlation_id,
            verb: self.verb.clone(),
            message_type: MessageType::Response,
            origin: self.origin.opposite(),
            payload,
        }
    }

    /// Builds an error reply answering `self`.
    #[must_use]
    pub fn error_to(&self, code: ResultCode, info: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert(CODE_KEY.to_owned(), Value::from(code.as_str()));
        payload.insert(INFO_KEY.to_owned(), Value::from(info.into()));
        Self {
            correlation_id: self.correlation_id,
            verb: self.verb.clone(),
            message_type: MessageType::Error,
            origin: self.origin.opposite(),
            payload,
        }
    }

    /// Correlation id, always `None` for notifications.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self.message_type {
            MessageType::Notification => None,
            _ => self.correlation_id,
        }
    }

    /// Verb of the message.
    #[must_use]
    pub fn verb(&self) -> &VerbId {
        &self.verb
    }

    /// Protocol role of the message.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Side of the bridge the message comes from.
    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Message parameters.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Looks up one named parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Consumes the envelope, returning its parameters.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Result code and detail of an error envelope.
    ///
    /// Error envelopes whose payload lacks a recognised code report
    /// [`ResultCode::GenericError`].
    #[must_use]
    pub fn error_details(&self) -> Option<(ResultCode, String)> {
        if self.message_type != MessageType::Error {
            return None;
        }
        let code = self
            .payload
            .get(CODE_KEY)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or(ResultCode::GenericError);
        let info = self
            .payload
            .get(INFO_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        Some((code, info))
    }
}
