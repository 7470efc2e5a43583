//! Timestamp and nut expiry handling.
//!
//! Nut records carry their creation time; a `NutTtl` decides when a
//! record becomes eligible for garbage collection.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Timestamp in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a new timestamp from milliseconds since Unix epoch.
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current time as a timestamp.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("System time before Unix epoch");
        Self(duration.as_millis() as i64)
    }

    /// Returns the milliseconds since Unix epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns true if this timestamp is in the past relative to the other.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Returns true if this timestamp is in the future relative to the other.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Adds a duration to this timestamp.
    pub fn add(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as i64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

/// Time-to-live for issued nuts.
///
/// A nut older than its TTL behaves exactly like one that was never
/// issued: lookups treat it as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutTtl(Duration);

impl NutTtl {
    /// Default nut lifetime in seconds (5 minutes).
    pub const DEFAULT_SECS: u64 = 300;

    /// Creates a new TTL.
    pub const fn new(duration: Duration) -> Self {
        Self(duration)
    }

    /// Creates a TTL from seconds.
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    /// Returns the inner duration.
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    /// Calculates the expiration timestamp for a nut issued at `created_at`.
    pub fn expires_at(&self, created_at: Timestamp) -> Timestamp {
        created_at.add(self.0)
    }

    /// Returns true if a nut created at `created_at` has expired by `now`.
    pub fn is_expired(&self, created_at: Timestamp, now: Timestamp) -> bool {
        now.is_after(&self.expires_at(created_at))
    }
}

impl Default for NutTtl {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_SECS)
    }
}
