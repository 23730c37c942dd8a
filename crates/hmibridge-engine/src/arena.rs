//! Generational slot table holding live commands.
//!
//! Commands are addressed by [`CommandHandle`] rather than by reference so
//! that the correlation registry can name an owner without keeping it alive.
//! A handle whose slot has since been reused no longer resolves.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::session::SessionId;

/// Stable, copyable reference to a live command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandHandle {
    index: u32,
    generation: u32,
}

impl fmt::Display for CommandHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "cmd-{}.{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    occupant: Option<(SessionId, T)>,
}

#[derive(Debug)]
struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

/// Thread-safe arena of session-tagged values.
#[derive(Debug)]
pub(crate) struct Arena<T> {
    inner: Mutex<Slots<T>>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Slots::default()),
        }
    }
}

impl<T: Clone> Arena<T> {
    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, session: SessionId, value: T) -> CommandHandle {
        let mut table = self.lock();
        table.live += 1;
        if let Some(index) = table.free.pop() {
            if let Some(slot) = table.slots.get_mut(index as usize) {
                slot.occupant = Some((session, value));
                return CommandHandle {
                    index,
                    generation: slot.generation,
                };
            }
        }
        let index = u32::try_from(table.slots.len()).unwrap_or(u32::MAX);
        table.slots.push(Slot {
            generation: 0,
            occupant: Some((session, value)),
        });
        CommandHandle {
            index,
            generation: 0,
        }
    }

    pub(crate) fn get(&self, handle: CommandHandle) -> Option<T> {
        let table = self.lock();
        table
            .slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.occupant.as_ref())
            .map(|(_, value)| value.clone())
    }

    pub(crate) fn remove(&self, handle: CommandHandle) -> Option<T> {
        let mut table = self.lock();
        let slot = table
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let (_, value) = slot.occupant.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        table.free.push(handle.index);
        table.live -= 1;
        Some(value)
    }

    /// Handles of every value owned by `session`.
    pub(crate) fn handles_for_session(&self, session: SessionId) -> Vec<CommandHandle> {
        self.handles_matching(|owner| owner == session)
    }

    pub(crate) fn handles(&self) -> Vec<CommandHandle> {
        self.handles_matching(|_| true)
    }

    fn handles_matching(&self, predicate: impl Fn(SessionId) -> bool) -> Vec<CommandHandle> {
        let table = self.lock();
        table
            .slots
            .iter()
            .zip(0_u32..)
            .filter_map(|(slot, index)| {
                slot.occupant
                    .as_ref()
                    .filter(|(owner, _)| predicate(*owner))
                    .map(|_| CommandHandle {
                        index,
                        generation: slot.generation,
                    })
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().live
    }
}
