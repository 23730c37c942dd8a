//! Correlation registry: the table of outstanding outbound requests.
//!
//! Every operation runs under a single lock, so "register then send",
//! "take on reply" and "sweep on timer" never interleave partially. Removal
//! goes through one of [`CorrelationRegistry::take`],
//! [`CorrelationRegistry::take_reply`], `cancel*`, or
//! [`CorrelationRegistry::sweep`]; whichever wins the race owns delivery, and
//! the losers observe an absent entry.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, trace};

use crate::arena::CommandHandle;
use crate::envelope::{CorrelationId, Origin, VerbId};
use crate::error::EngineError;
use crate::session::SessionId;

const CORRELATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::correlation");

/// Bookkeeping for one outstanding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    owner: CommandHandle,
    session: SessionId,
    verb: VerbId,
    reply_origin: Origin,
    deadline: Instant,
}

impl PendingEntry {
    /// Command awaiting the reply.
    #[must_use]
    pub const fn owner(&self) -> CommandHandle {
        self.owner
    }

    /// Session the owning command belongs to.
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }

    /// Verb of the outstanding request.
    #[must_use]
    pub const fn verb(&self) -> &VerbId {
        &self.verb
    }

    /// Side of the bridge the reply must come from.
    #[must_use]
    pub const fn reply_origin(&self) -> Origin {
        self.reply_origin
    }

    /// Instant after which the request is considered timed out.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Why a reply did not claim the entry its correlation id names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyMismatch {
    /// Nothing is outstanding under the id.
    #[error("no pending request")]
    Unknown,
    /// The reply came from the wrong side of the bridge.
    #[error("expected a reply {expected}, received one {received}")]
    Origin {
        /// Side the request was sent to.
        expected: Origin,
        /// Side the reply came from.
        received: Origin,
    },
    /// The reply names a different verb.
    #[error("expected a reply to '{expected}', received one to '{received}'")]
    Verb {
        /// Verb of the pending request.
        expected: VerbId,
        /// Verb named by the reply.
        received: VerbId,
    },
}

#[derive(Debug, Default)]
struct Table {
    last_issued: u32,
    entries: HashMap<CorrelationId, PendingEntry>,
}

impl Table {
    /// Next free id after the last one issued, skipping `0` and live ids.
    fn allocate(&mut self) -> Option<CorrelationId> {
        let mut candidate = self.last_issued;
        for _ in 0..=self.entries.len() {
            candidate = candidate.wrapping_add(1);
            let Some(id) = CorrelationId::new(candidate) else {
                continue;
            };
            if !self.entries.contains_key(&id) {
                self.last_issued = candidate;
                return Some(id);
            }
        }
        None
    }

    fn drain_where(
        &mut self,
        predicate: impl Fn(&PendingEntry) -> bool,
    ) -> Vec<(CorrelationId, PendingEntry)> {
        let ids: Vec<CorrelationId> = self
            .entries
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(id, _)| *id)
            .collect();
        let mut drained: Vec<(CorrelationId, PendingEntry)> = ids
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|entry| (id, entry)))
            .collect();
        drained.sort_by(|(left_id, left), (right_id, right)| {
            left.deadline
                .cmp(&right.deadline)
                .then(left_id.cmp(right_id))
        });
        drained
    }
}

/// Thread-safe table mapping correlation ids to their owners.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    table: Mutex<Table>,
}

impl CorrelationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry whose first allocation is `first`.
    #[must_use]
    pub fn starting_at(first: CorrelationId) -> Self {
        Self {
            table: Mutex::new(Table {
                last_issued: first.get().wrapping_sub(1),
                entries: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a fresh id and records the owner, the side the reply must
    /// come from, and the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CorrelationExhausted`] when every non-zero id
    /// is in flight.
    pub fn register(
        &self,
        owner: CommandHandle,
        session: SessionId,
        verb: VerbId,
        reply_origin: Origin,
        deadline: Instant,
    ) -> Result<CorrelationId, EngineError> {
        let mut table = self.lock();
        let Some(id) = table.allocate() else {
            return Err(EngineError::CorrelationExhausted {
                live: table.entries.len(),
            });
        };
        trace!(
            target: CORRELATION_TARGET,
            correlation_id = id.get(),
            verb = %verb,
            owner = %owner,
            "registered pending request"
        );
        table.entries.insert(
            id,
            PendingEntry {
                owner,
                session,
                verb,
                reply_origin,
                deadline,
            },
        );
        Ok(id)
    }

    /// Atomically removes and returns the entry for `id`.
    pub fn take(&self, id: CorrelationId) -> Option<PendingEntry> {
        self.lock().entries.remove(&id)
    }

    /// Removes the entry for `id` when the reply matches it.
    ///
    /// A reply from the wrong side or for another verb leaves the entry in
    /// place, so the genuine reply or the deadline can still resolve it.
    ///
    /// # Errors
    ///
    /// Returns the [`ReplyMismatch`] that kept the entry from being taken.
    pub fn take_reply(
        &self,
        id: CorrelationId,
        origin: Origin,
        verb: &VerbId,
    ) -> Result<PendingEntry, ReplyMismatch> {
        let mut table = self.lock();
        let entry = table.entries.get(&id).ok_or(ReplyMismatch::Unknown)?;
        if entry.reply_origin != origin {
            return Err(ReplyMismatch::Origin {
                expected: entry.reply_origin,
                received: origin,
            });
        }
        if &entry.verb != verb {
            return Err(ReplyMismatch::Verb {
                expected: entry.verb.clone(),
                received: verb.clone(),
            });
        }
        table.entries.remove(&id).ok_or(ReplyMismatch::Unknown)
    }

    /// Removes the entry for `id` without delivering anything.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        let removed = self.lock().entries.remove(&id).is_some();
        if removed {
            debug!(
                target: CORRELATION_TARGET,
                correlation_id = id.get(),
                "cancelled pending request"
            );
        }
        removed
    }

    /// Removes every entry owned by `session`, returning their ids.
    pub fn cancel_session(&self, session: SessionId) -> Vec<CorrelationId> {
        Self::ids(self.lock().drain_where(|entry| entry.session == session))
    }

    /// Removes every entry owned by `owner`, returning their ids.
    pub fn cancel_owner(&self, owner: CommandHandle) -> Vec<CorrelationId> {
        Self::ids(self.lock().drain_where(|entry| entry.owner == owner))
    }

    /// Removes every entry, returning their ids.
    pub fn cancel_all(&self) -> Vec<CorrelationId> {
        Self::ids(self.lock().drain_where(|_| true))
    }

    /// Removes every entry whose deadline is at or before `now`.
    ///
    /// Expired entries are returned ordered by deadline, then id.
    pub fn sweep(&self, now: Instant) -> Vec<(CorrelationId, PendingEntry)> {
        self.lock().drain_where(|entry| entry.deadline <= now)
    }

    /// Returns `true` when `id` is outstanding.
    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` when no request is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn ids(drained: Vec<(CorrelationId, PendingEntry)>) -> Vec<CorrelationId> {
        let mut ids: Vec<CorrelationId> = drained.into_iter().map(|(id, _)| id).collect();
        ids.sort_unstable();
        ids
    }
}
