//! Microsecond-precision timestamp type
//!
//! This is the canonical time representation used by every engine and by the
//! node codec's expire-at field. A single sentinel value represents "no
//! expiry" so that backends lacking a nullable timestamp column still have
//! something concrete to store.
//!
//! ## Precision
//!
//! Timestamps are stored as microseconds since Unix epoch (1970-01-01 UTC).
//!
//! ```
//! use stratakv_core::Timestamp;
//!
//! let now = Timestamp::now();
//! let from_secs = Timestamp::from_secs(1000);
//! let from_micros = Timestamp::from_micros(1_000_000_000);
//! assert!(from_secs < from_micros || from_secs.as_micros() == from_micros.as_micros());
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since epoch for the sentinel instant `9999-12-31T23:59:59`.
const SENTINEL_SECS: u64 = 253_402_300_799;

/// Microsecond-precision timestamp
///
/// ## Invariants
///
/// - Timestamps are always non-negative (u64).
/// - Timestamps are always in microseconds.
/// - [`Timestamp::NEVER`] is the distinguished far-future sentinel denoting
///   "no expiry"; it is an ordinary value for comparison purposes (it sorts
///   after any real expiry) but carries no semantic meaning beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Maximum representable timestamp
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Sentinel expiry `9999-12-31T23:59:59`, meaning "never expires"
    pub const NEVER: Timestamp = Timestamp(SENTINEL_SECS * 1_000_000);

    /// Create a timestamp for the current moment
    ///
    /// Returns [`Timestamp::EPOCH`] if the system clock reads before the
    /// Unix epoch (e.g. a misconfigured clock).
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as u64)
    }

    /// Create a timestamp from microseconds since epoch
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Create a timestamp from milliseconds since epoch
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1_000))
    }

    /// Create a timestamp from seconds since epoch
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// Get microseconds since Unix epoch
    #[inline]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Get milliseconds since Unix epoch (truncates)
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000
    }

    /// Get seconds since Unix epoch (truncates)
    #[inline]
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// True iff this is the sentinel "never expires" instant.
    ///
    /// A zero timestamp (the default, absent-expiry value coming off the
    /// wire or out of a backend that stores zero for "unset") is treated as
    /// an alias for the sentinel: both mean "no expiry".
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        *self == Timestamp::NEVER || *self == Timestamp::EPOCH
    }

    /// True iff this instant is at or before `now`, excluding the sentinel.
    #[inline]
    pub fn has_elapsed(&self, now: Timestamp) -> bool {
        !self.is_sentinel() && *self <= now
    }

    /// Compute duration since an earlier timestamp
    ///
    /// Returns `None` if `earlier` is actually later than `self`.
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        if self.0 >= earlier.0 {
            Some(Duration::from_micros(self.0 - earlier.0))
        } else {
            None
        }
    }

    /// Add a duration to this timestamp, saturating at [`Timestamp::MAX`].
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_micros() as u64))
    }

    /// Subtract a duration from this timestamp, saturating at [`Timestamp::EPOCH`].
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration.as_micros() as u64))
    }

    /// Check if this timestamp is before another
    #[inline]
    pub fn is_before(&self, other: Timestamp) -> bool {
        self.0 < other.0
    }

    /// Check if this timestamp is after another
    #[inline]
    pub fn is_after(&self, other: Timestamp) -> bool {
        self.0 > other.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_sentinel() {
            return write!(f, "9999-12-31T23:59:59");
        }
        let secs = self.0 / 1_000_000;
        let micros = self.0 % 1_000_000;
        write!(f, "{}.{:06}", secs, micros)
    }
}

impl From<u64> for Timestamp {
    fn from(micros: u64) -> Self {
        Timestamp::from_micros(micros)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl From<Duration> for Timestamp {
    fn from(duration: Duration) -> Self {
        Timestamp::from_micros(duration.as_micros() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_is_zero() {
        assert_eq!(Timestamp::EPOCH.as_micros(), 0);
    }

    #[test]
    fn sentinel_is_far_future() {
        assert!(Timestamp::NEVER > Timestamp::from_secs(4_000_000_000));
        assert!(Timestamp::NEVER.is_sentinel());
        assert!(Timestamp::EPOCH.is_sentinel());
        assert!(!Timestamp::from_secs(1000).is_sentinel());
    }

    #[test]
    fn has_elapsed_ignores_sentinel() {
        let now = Timestamp::now();
        assert!(!Timestamp::NEVER.has_elapsed(now));
        assert!(!Timestamp::EPOCH.has_elapsed(now));
        assert!(Timestamp::from_secs(1).has_elapsed(now));
        assert!(!now.saturating_add(Duration::from_secs(3600)).has_elapsed(now));
    }

    #[test]
    fn from_secs_millis_micros_agree() {
        let ts = Timestamp::from_secs(1000);
        assert_eq!(ts.as_secs(), 1000);
        assert_eq!(ts.as_millis(), 1_000_000);
        assert_eq!(ts.as_micros(), 1_000_000_000);
    }

    #[test]
    fn ordering_and_duration() {
        let t1 = Timestamp::from_micros(1000);
        let t2 = Timestamp::from_micros(3000);
        assert!(t1 < t2);
        assert_eq!(t2.duration_since(t1).unwrap(), Duration::from_micros(2000));
        assert!(t1.duration_since(t2).is_none());
    }

    #[test]
    fn saturating_arithmetic() {
        assert_eq!(Timestamp::MAX.saturating_add(Duration::from_micros(1)), Timestamp::MAX);
        assert_eq!(
            Timestamp::EPOCH.saturating_sub(Duration::from_micros(1)),
            Timestamp::EPOCH
        );
    }

    #[test]
    fn display_renders_sentinel_as_date() {
        assert_eq!(format!("{}", Timestamp::NEVER), "9999-12-31T23:59:59");
    }

    #[test]
    fn serialization_round_trips() {
        let ts = Timestamp::from_micros(1_234_567);
        let json = serde_json::to_string(&ts).unwrap();
        let restored: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, restored);
    }
}
