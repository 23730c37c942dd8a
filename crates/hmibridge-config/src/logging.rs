//! Shape of the bridge's log records.
//!
//! The bridge logs to stderr only, since stdout carries the JSON line link.
//! The format decides how those stderr records are rendered.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Rendering of log records on stderr.
///
/// Accepted spellings are `json` and `compact`, case-insensitively, on the
/// command line (`--log-format`), in `HMIBRIDGE_LOG_FORMAT`, and in the
/// configuration file.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record with the event fields flattened, for
    /// collection by the head unit's log daemon.
    #[default]
    Json,
    /// One terse line per record, coloured when stderr is a terminal.
    Compact,
}

/// Error returned when text names no [`LogFormat`].
pub type LogFormatParseError = strum::ParseError;
