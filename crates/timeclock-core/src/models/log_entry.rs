//! Attendance log entry model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Direction of a punch: clocking in or clocking out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogKind {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl LogKind {
    /// Wire/display label (`IN` or `OUT`)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            other => Err(Error::InvalidInput(format!(
                "unknown log type '{other}' (expected IN or OUT)"
            ))),
        }
    }
}

/// A single Time-In / Time-Out record in a user's attendance log
///
/// The wire form is `{ "id": ..., "type": "IN"|"OUT", "timestamp": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Entry identifier, derived from the creation instant
    pub id: String,
    /// Punch direction
    #[serde(rename = "type")]
    pub kind: LogKind,
    /// Creation instant, ISO-8601 UTC with millisecond precision
    pub timestamp: String,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    #[must_use]
    pub fn new(kind: LogKind) -> Self {
        Self::new_at(kind, Utc::now())
    }

    /// Create an entry stamped with `instant`
    ///
    /// Both `id` and `timestamp` are the millisecond ISO-8601 rendering of the
    /// instant, so two entries created in the same millisecond share an id.
    #[must_use]
    pub fn new_at(kind: LogKind, instant: DateTime<Utc>) -> Self {
        let stamp = format_timestamp(instant);
        Self {
            id: stamp.clone(),
            kind,
            timestamp: stamp,
        }
    }

    /// Parse the stored timestamp, if it is valid RFC 3339
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|instant| instant.with_timezone(&Utc))
    }

    /// Timestamp rendered in the local time zone for display
    ///
    /// Falls back to the raw stored text when it cannot be parsed.
    #[must_use]
    pub fn timestamp_local(&self) -> String {
        self.parsed_timestamp().map_or_else(
            || self.timestamp.clone(),
            |instant| {
                instant
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        )
    }

    /// One-line rendering used by the history list: `IN at 2026-10-18 09:00:00`
    #[must_use]
    pub fn display_line(&self) -> String {
        format!("{} at {}", self.kind, self.timestamp_local())
    }
}

/// Render an instant the way entries store it: `2026-10-18T09:00:00.000Z`
#[must_use]
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}
