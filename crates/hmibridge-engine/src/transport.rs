//! Seams towards the physical links.
//!
//! The engine only ever hands fully-formed envelopes to a [`Transport`].
//! Implementations must not deliver inbound traffic synchronously from
//! [`Transport::send`]; replies go through the inbound queue instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::envelope::{Envelope, MessageType, VerbId};
use crate::error::TransportError;

/// Outbound half of a link.
pub trait Transport: Send + Sync {
    /// Hands one envelope to the link.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the link refuses the envelope.
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Name used in logs and errors.
    fn name(&self) -> &str;
}

/// Platform hook started once the engine is ready.
pub trait DeviceDiscovery: Send + Sync {
    /// Begins scanning for client devices.
    fn start_devices_discovery(&self);

    /// Starts the connection manager for discovered devices.
    fn start_transport_manager(&self);
}

/// In-memory transport recording every envelope it is given.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Envelope>>,
    refuse: AtomicBool,
}

impl RecordingTransport {
    /// Name reported by [`Transport::name`].
    pub const NAME: &'static str = "recording";

    /// Creates an empty transport that accepts every envelope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent sends fail, or succeed again.
    pub fn refuse_sends(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Envelope>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every accepted envelope, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<Envelope> {
        self.lock().clone()
    }

    /// Removes and returns every accepted envelope.
    pub fn take_sent(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.lock())
    }

    /// Most recent request sent for `verb`.
    #[must_use]
    pub fn last_request(&self, verb: &str) -> Option<Envelope> {
        self.lock()
            .iter()
            .rev()
            .find(|envelope| {
                envelope.message_type() == MessageType::Request
                    && envelope.verb() == &VerbId::from(verb)
            })
            .cloned()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::rejected(Self::NAME, "link refused the envelope"));
        }
        self.lock().push(envelope.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        Self::NAME
    }
}
