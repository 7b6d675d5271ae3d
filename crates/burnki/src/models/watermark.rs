//! Watermark tracking for incremental sync

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Boundary between already-synced and not-yet-synced burned items
///
/// An empty watermark means nothing has been synced yet. The watermark is
/// only ever advanced, and only after a whole batch has been committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(Option<DateTime<Utc>>);

impl Watermark {
    /// The empty watermark (full history)
    pub fn empty() -> Self {
        Self(None)
    }

    /// A watermark at the given instant
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self(Some(timestamp))
    }

    /// Parse a persisted watermark
    ///
    /// An empty or blank string is the empty watermark; anything else must
    /// be an RFC 3339 timestamp.
    pub fn parse(value: &str) -> Result<Self, chrono::ParseError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(Self::empty());
        }
        let parsed = DateTime::parse_from_rfc3339(value)?;
        Ok(Self::at(parsed.with_timezone(&Utc)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Whether an item burned at `timestamp` lies after this watermark
    pub fn admits(&self, timestamp: DateTime<Utc>) -> bool {
        match self.0 {
            Some(boundary) => timestamp > boundary,
            None => true,
        }
    }

    /// Advance to `timestamp` if it is later; never moves backwards
    pub fn advanced_to(self, timestamp: DateTime<Utc>) -> Self {
        match self.0 {
            Some(current) if current >= timestamp => self,
            _ => Self::at(timestamp),
        }
    }

    /// Serialized form used in config files and API filters
    ///
    /// Whole seconds render as `2024-01-03T00:00:00Z`; sub-second
    /// precision is kept when present. Empty renders as "".
    pub fn to_api_string(&self) -> String {
        self.0
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .unwrap_or_default()
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("(never synced)")
        } else {
            f.write_str(&self.to_api_string())
        }
    }
}
