//! Clock abstraction used by the catalog caches and the in-memory catalog
//!
//! Everything that needs "now" takes an `Arc<dyn TimeProvider>` so that expiry can be driven by a
//! [`MockProvider`] in tests instead of real sleeps.
use std::{
    ops::{Add, Sub},
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;

/// A UTC timestamp returned by a [`TimeProvider`]
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Time(DateTime<Utc>);

impl Add<Duration> for Time {
    type Output = Self;

    /// Saturates at the maximum representable time
    fn add(self, rhs: Duration) -> Self::Output {
        self.checked_add(rhs).unwrap_or(Self(DateTime::<Utc>::MAX_UTC))
    }
}

impl Sub<Duration> for Time {
    type Output = Self;

    /// Saturates at the minimum representable time
    fn sub(self, rhs: Duration) -> Self::Output {
        self.checked_sub(rhs).unwrap_or(Self(DateTime::<Utc>::MIN_UTC))
    }
}

impl std::fmt::Debug for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Time {
    /// Makes a new `Time` from nanoseconds since the UNIX epoch
    pub fn from_timestamp_nanos(nanos: i64) -> Self {
        Self(Utc.timestamp_nanos(nanos))
    }

    /// Makes a new `Time` from milliseconds since the UNIX epoch, `None` if out of range
    pub fn from_timestamp_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self)
    }

    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Nanoseconds since the UNIX epoch, saturating outside of the `i64` range
    pub fn timestamp_nanos(&self) -> i64 {
        self.0.timestamp_nanos_opt().unwrap_or(if self.0.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        })
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Returns the duration since `other`, or `None` if `other` is later than `self`
    pub fn checked_duration_since(&self, other: Self) -> Option<Duration> {
        self.0.signed_duration_since(other.0).to_std().ok()
    }

    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let duration = chrono::Duration::from_std(duration).ok()?;
        self.0.checked_add_signed(duration).map(Self)
    }

    pub fn checked_sub(&self, duration: Duration) -> Option<Self> {
        let duration = chrono::Duration::from_std(duration).ok()?;
        self.0.checked_sub_signed(duration).map(Self)
    }

    pub fn date_time(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Source of the current [`Time`]
pub trait TimeProvider: std::fmt::Debug + Send + Sync + 'static {
    /// Returns the current `Time`. No guarantees are made about monotonicity
    fn now(&self) -> Time;
}

/// A [`TimeProvider`] backed by the system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProvider;

impl SystemProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for SystemProvider {
    fn now(&self) -> Time {
        Time(Utc::now())
    }
}

/// A [`TimeProvider`] that only moves when told to
#[derive(Debug)]
pub struct MockProvider {
    now: RwLock<Time>,
}

impl MockProvider {
    pub fn new(start: Time) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, time: Time) {
        *self.now.write() = time
    }

    /// Advance the clock by `duration` and return the new time
    pub fn inc(&self, duration: Duration) -> Time {
        let mut now = self.now.write();
        *now = *now + duration;
        *now
    }
}

impl TimeProvider for MockProvider {
    fn now(&self) -> Time {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_moves_only_when_told() {
        let provider = MockProvider::new(Time::from_timestamp_nanos(0));
        assert_eq!(provider.now().timestamp_nanos(), 0);

        provider.set(Time::from_timestamp_nanos(12));
        assert_eq!(provider.now().timestamp_nanos(), 12);

        let t = provider.inc(Duration::from_secs(1));
        assert_eq!(t.timestamp_nanos(), 1_000_000_012);
        assert_eq!(provider.now(), t);
    }

    #[test]
    fn duration_since() {
        let a = Time::from_timestamp_millis(1_000).unwrap();
        let b = a + Duration::from_millis(2_500);
        assert_eq!(b.checked_duration_since(a), Some(Duration::from_millis(2_500)));
        assert_eq!(a.checked_duration_since(b), None);
        assert_eq!(b - Duration::from_millis(2_500), a);
    }

    #[test]
    fn millis_out_of_range() {
        assert!(Time::from_timestamp_millis(i64::MAX).is_none());
        assert_eq!(
            Time::from_timestamp_millis(42).unwrap().timestamp_millis(),
            42
        );
    }
}
