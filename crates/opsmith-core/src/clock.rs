//! Time source abstraction.
//!
//! Report period resolution, statement date defaults, and confirmation TTLs
//! all read the current time through an injected clock so they are
//! deterministic under test.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::types::Timestamp;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn timestamp(&self) -> Timestamp {
        Timestamp::from_datetime(self.now())
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a settable instant, for deterministic tests.
///
/// Stores whole seconds; sub-second precision is not preserved.
#[derive(Debug)]
pub struct FixedClock {
    epoch_secs: AtomicI64,
}

impl FixedClock {
    pub fn at(datetime: DateTime<Utc>) -> Self {
        Self {
            epoch_secs: AtomicI64::new(datetime.timestamp()),
        }
    }

    /// Midnight UTC on the given calendar date.
    pub fn on(year: i32, month: u32, day: u32) -> Self {
        let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default();
        let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        Self::at(Utc.from_utc_datetime(&naive))
    }

    pub fn set(&self, datetime: DateTime<Utc>) {
        self.epoch_secs.store(datetime.timestamp(), Ordering::SeqCst);
    }

    pub fn advance_seconds(&self, secs: i64) {
        self.epoch_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.epoch_secs.load(Ordering::SeqCst), 0).unwrap_or_default()
    }
}
