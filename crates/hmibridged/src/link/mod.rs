//! JSON line link between the bridge and its peers.
//!
//! Input lines are [`InboundFrame`]s: an envelope plus the session it
//! belongs to, where session `0` is the head unit. Output lines are
//! [`OutboundFrame`]s naming the [`Peer`] that should receive the envelope.
//! One writer is shared by every peer so lines never interleave.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hmibridge_engine::{
    Envelope, InboundQueue, SessionId, StopSignal, Transport, TransportError, WorkerError,
    WorkerHandle,
};

const LINK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::link");
const READER_NAME: &str = "hmibridge-link-reader";

/// Receiver of an outbound line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    /// The head unit.
    Hmi,
    /// A client application.
    Application,
}

impl Peer {
    const fn transport_name(self) -> &'static str {
        match self {
            Self::Hmi => "jsonl-hmi",
            Self::Application => "jsonl-application",
        }
    }
}

/// One line read from the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Session the envelope belongs to; `0` is the head unit.
    #[serde(default)]
    pub session: u32,
    /// The envelope itself.
    pub envelope: Envelope,
}

/// One line written to the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Intended receiver.
    pub peer: Peer,
    /// The envelope itself.
    pub envelope: Envelope,
}

/// Shared writing end of the link.
pub struct JsonLineLink<W> {
    writer: Arc<Mutex<W>>,
}

impl<W> Clone for JsonLineLink<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<W> std::fmt::Debug for JsonLineLink<W> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("JsonLineLink")
            .finish_non_exhaustive()
    }
}

impl<W> JsonLineLink<W>
where
    W: Write + Send,
{
    /// Wraps `writer`.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Transport addressing `peer` through this link.
    #[must_use]
    pub fn transport(&self, peer: Peer) -> JsonLineTransport<W> {
        JsonLineTransport {
            link: self.clone(),
            peer,
        }
    }

    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

/// [`Transport`] writing envelopes for one peer as JSON lines.
pub struct JsonLineTransport<W> {
    link: JsonLineLink<W>,
    peer: Peer,
}

impl<W> Clone for JsonLineTransport<W> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            peer: self.peer,
        }
    }
}

impl<W> std::fmt::Debug for JsonLineTransport<W> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("JsonLineTransport")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl<W> Transport for JsonLineTransport<W>
where
    W: Write + Send,
{
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let frame = OutboundFrame {
            peer: self.peer,
            envelope: envelope.clone(),
        };
        let line = serde_json::to_vec(&frame)
            .map_err(|error| TransportError::rejected(self.name(), error.to_string()))?;
        self.link.write_line(&line).map_err(|error| {
            if error.kind() == io::ErrorKind::BrokenPipe {
                TransportError::closed(self.name())
            } else {
                TransportError::rejected(self.name(), error.to_string())
            }
        })?;
        debug!(
            target: LINK_TARGET,
            peer = self.name(),
            verb = %envelope.verb(),
            message_type = %envelope.message_type(),
            "wrote envelope"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        self.peer.transport_name()
    }
}

/// Starts a thread feeding every frame read from `input` into `queue`.
///
/// The thread raises `closed` once the input ends, after dropping `queue`,
/// so a dispatcher draining the queue stops on its own when it runs dry.
///
/// # Errors
///
/// Returns [`WorkerError::Spawn`] when the thread cannot be created.
pub fn spawn_reader<R>(
    input: R,
    queue: InboundQueue,
    closed: StopSignal,
) -> Result<WorkerHandle, WorkerError>
where
    R: BufRead + Send + 'static,
{
    WorkerHandle::spawn(READER_NAME, closed, move |signal| {
        pump(input, &queue, &signal);
        drop(queue);
        signal.raise();
    })
}

/// Reads frames until the input ends, the queue closes or `stop` is raised.
///
/// Malformed lines are logged and skipped. Returns the number of envelopes
/// delivered.
pub(crate) fn pump<R: BufRead>(input: R, queue: &InboundQueue, stop: &StopSignal) -> usize {
    let mut delivered = 0_usize;
    for (index, line) in input.lines().enumerate() {
        if stop.is_raised() {
            break;
        }
        let text = match line {
            Ok(text) => text,
            Err(error) => {
                warn!(target: LINK_TARGET, error = %error, "link input failed");
                break;
            }
        };
        if text.trim().is_empty() {
            continue;
        }
        let frame = match serde_json::from_str::<InboundFrame>(&text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(
                    target: LINK_TARGET,
                    line = index + 1,
                    error = %error,
                    "skipping malformed frame"
                );
                continue;
            }
        };
        let session = SessionId::new(frame.session);
        if let Err(error) = queue.connection(session).deliver(frame.envelope) {
            debug!(target: LINK_TARGET, error = %error, "dispatcher is gone");
            break;
        }
        delivered += 1;
    }
    info!(target: LINK_TARGET, delivered, "link input closed");
    delivered
}
