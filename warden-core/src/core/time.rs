// warden-core/src/core/time.rs
// ============================================================================
// Module: Warden Time Model
// Description: Canonical timestamp representation for records and events.
// Purpose: Carry RFC 3339 timestamps across every persistence boundary.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Warden timestamps are UTC instants that serialize as RFC 3339 / ISO 8601
//! strings. Audit records carry the already-formatted string (see
//! `core::audit`) so hash inputs never round-trip through a parser; all other
//! records use [`Timestamp`] directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ops::Add;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Error raised when a timestamp string fails to parse as RFC 3339.
#[derive(Debug, Error)]
#[error("invalid rfc3339 timestamp: {0}")]
pub struct TimestampParseError(String);

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// UTC instant serialized as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Returns the current UTC instant.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Formats the timestamp as an RFC 3339 string.
    ///
    /// Formatting a UTC instant within the representable year range cannot
    /// fail; an out-of-range value degrades to the empty string rather than
    /// panicking.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.format(&Rfc3339).unwrap_or_default()
    }

    /// Parses an RFC 3339 timestamp string.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampParseError`] when the input is not valid RFC 3339.
    pub fn parse_rfc3339(value: &str) -> Result<Self, TimestampParseError> {
        OffsetDateTime::parse(value, &Rfc3339)
            .map(Self)
            .map_err(|_| TimestampParseError(value.to_string()))
    }

    /// Returns the timestamp advanced by the provided number of seconds.
    #[must_use]
    pub fn plus_seconds(&self, seconds: u64) -> Self {
        *self + Duration::from_secs(seconds)
    }

    /// Returns the underlying [`OffsetDateTime`].
    #[must_use]
    pub const fn as_datetime(&self) -> OffsetDateTime {
        self.0
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }
}

impl From<OffsetDateTime> for Timestamp {
    fn from(value: OffsetDateTime) -> Self {
        Self(value)
    }
}
