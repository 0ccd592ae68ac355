use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A UTC timestamp wrapper around `chrono::DateTime<Utc>`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtcTime {
    inner: DateTime<Utc>,
}

impl UtcTime {
    /// Get the current UTC time.
    pub fn now() -> Self {
        Self { inner: Utc::now() }
    }

    /// Create from a chrono `DateTime<Utc>`.
    pub fn from_chrono(dt: DateTime<Utc>) -> Self {
        Self { inner: dt }
    }

    /// Create from a filesystem timestamp.
    pub fn from_system_time(t: SystemTime) -> Self {
        Self {
            inner: DateTime::<Utc>::from(t),
        }
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_chrono(&self) -> &DateTime<Utc> {
        &self.inner
    }

    /// Seconds since Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.inner.timestamp()
    }

    /// Nanoseconds since Unix epoch, clamped at zero for pre-epoch times.
    pub fn timestamp_nanos(&self) -> u128 {
        let secs = self.inner.timestamp().max(0) as u128;
        secs * 1_000_000_000 + u128::from(self.inner.timestamp_subsec_nanos())
    }

    /// Whole days elapsed from `earlier` to `self`, rounded toward zero.
    ///
    /// Negative when `earlier` lies in the future.
    pub fn whole_days_since(&self, earlier: &UtcTime) -> i64 {
        (self.inner - earlier.inner).num_days()
    }

    /// This time shifted back by `days`.
    pub fn days_ago(&self, days: i64) -> Self {
        Self {
            inner: self.inner - ChronoDuration::days(days),
        }
    }
}

impl fmt::Debug for UtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UtcTime({})", self.inner.to_rfc3339())
    }
}

impl fmt::Display for UtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.to_rfc3339())
    }
}

impl Default for UtcTime {
    fn default() -> Self {
        Self {
            inner: DateTime::<Utc>::default(),
        }
    }
}

impl From<DateTime<Utc>> for UtcTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self { inner: dt }
    }
}

impl From<UtcTime> for DateTime<Utc> {
    fn from(t: UtcTime) -> Self {
        t.inner
    }
}

/// Source of the current time.
///
/// Injected into the allocator and the reclaimer so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> UtcTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcTime {
        UtcTime::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<UtcTime>>,
}

impl FixedClock {
    pub fn new(now: UtcTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: UtcTime) {
        *self.now.lock() = now;
    }

    /// Move the clock forward by `nanos` nanoseconds.
    pub fn advance_nanos(&self, nanos: i64) {
        let mut guard = self.now.lock();
        *guard = UtcTime::from_chrono(*guard.as_chrono() + ChronoDuration::nanoseconds(nanos));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> UtcTime {
        *self.now.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> UtcTime {
        (**self).now()
    }
}
