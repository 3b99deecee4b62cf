//! Wall-clock source for the calendar part of a snapshot.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{Local, NaiveDateTime, TimeDelta};

/// Source of the local date-time a snapshot is stamped with.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Advances by `step` on every read, starting at `start`.
#[derive(Debug)]
pub struct SteppingClock {
    start: NaiveDateTime,
    step: TimeDelta,
    reads: AtomicU32,
}

impl SteppingClock {
    pub fn new(start: NaiveDateTime, step: TimeDelta) -> Self {
        Self {
            start,
            step,
            reads: AtomicU32::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> NaiveDateTime {
        let n = self.reads.fetch_add(1, Ordering::Relaxed);
        self.start + self.step * n as i32
    }
}
