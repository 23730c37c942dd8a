//! Session identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a client-application connection.
///
/// Every command and every pending request belongs to exactly one session.
/// Requests started by the head unit belong to [`SessionId::HMI`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u32);

impl SessionId {
    /// Session owning operations started by the head unit.
    pub const HMI: Self = Self(0);

    /// Wraps a raw connection key.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw connection key.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
