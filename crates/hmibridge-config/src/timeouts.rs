//! Per-origin and per-verb request deadline directives.
//!
//! Directives use the textual form `origin:verb=millis`, for example
//! `hmi:SDL.GetListOfPermissions=5000`. A verb of `*` applies the deadline to
//! every verb issued for that origin.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Wildcard verb matching every request of an origin.
pub const ANY_VERB: &str = "*";

/// Origin of the operation a deadline applies to.
#[derive(
    Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OriginScope {
    /// Operations started by a client application.
    App,
    /// Operations started by the head unit.
    Hmi,
}

/// Errors produced when parsing [`TimeoutDirective`] values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeoutDirectiveParseError {
    /// Origin separator (`:`) was missing from the directive.
    #[error("directive '{0}' is missing the origin separator ':'")]
    MissingOrigin(String),
    /// Deadline assignment (`=`) was missing from the directive.
    #[error("directive '{0}' is missing the deadline assignment '='")]
    MissingTimeout(String),
    /// The origin could not be parsed.
    #[error("unsupported origin '{0}' (expected 'app' or 'hmi')")]
    InvalidOrigin(String),
    /// The verb part of the directive was empty.
    #[error("directive '{0}' names no verb")]
    EmptyVerb(String),
    /// The deadline was not a positive number of milliseconds.
    #[error("invalid deadline '{0}' (expected a positive number of milliseconds)")]
    InvalidTimeout(String),
}

/// Deadline override for one origin and verb.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TimeoutDirective {
    /// Origin the directive applies to.
    pub origin: OriginScope,
    /// Verb name, or [`ANY_VERB`] for an origin-wide deadline.
    pub verb: String,
    /// Deadline in milliseconds.
    pub timeout_ms: u64,
}

impl TimeoutDirective {
    /// Creates a new directive.
    #[must_use]
    pub fn new(origin: OriginScope, verb: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            origin,
            verb: verb.into(),
            timeout_ms,
        }
    }

    /// Returns `true` when the directive covers every verb of its origin.
    #[must_use]
    pub fn is_origin_wide(&self) -> bool {
        self.verb == ANY_VERB
    }
}

impl fmt::Display for TimeoutDirective {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}:{}={}",
            self.origin, self.verb, self.timeout_ms
        )
    }
}

impl FromStr for TimeoutDirective {
    type Err = TimeoutDirectiveParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (origin, rest) = input
            .split_once(':')
            .ok_or_else(|| TimeoutDirectiveParseError::MissingOrigin(input.to_owned()))?;
        let (verb, timeout) = rest
            .rsplit_once('=')
            .ok_or_else(|| TimeoutDirectiveParseError::MissingTimeout(input.to_owned()))?;
        let scope = OriginScope::from_str(origin.trim())
            .map_err(|_| TimeoutDirectiveParseError::InvalidOrigin(origin.to_owned()))?;
        let verb_name = verb.trim();
        if verb_name.is_empty() {
            return Err(TimeoutDirectiveParseError::EmptyVerb(input.to_owned()));
        }
        let timeout_ms = timeout
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|millis| *millis > 0)
            .ok_or_else(|| TimeoutDirectiveParseError::InvalidTimeout(timeout.to_owned()))?;
        Ok(Self::new(scope, verb_name, timeout_ms))
    }
}

/// Deduplicates directives in-place, keeping the last directive per origin and verb.
///
/// Verb names are matched exactly; RPC names are case sensitive.
pub fn deduplicate_directives(directives: &mut Vec<TimeoutDirective>) {
    let mut merged: BTreeMap<(OriginScope, String), TimeoutDirective> = BTreeMap::new();
    for directive in directives.drain(..) {
        merged.insert((directive.origin, directive.verb.clone()), directive);
    }
    *directives = merged.into_values().collect();
}
