//! Time policy for core timestamps.
//!
//! # Responsibility
//! - Supply UTC epoch-millisecond timestamps to every mutating path.
//! - Model half-open date windows used by history and evidence queries.
//!
//! # Invariants
//! - All persisted timestamps are UTC epoch milliseconds; display conversion
//!   happens outside core.
//! - `DateRange` is `[start_ms, end_ms)` with `start_ms <= end_ms`.

use crate::error::{KanbanError, KanbanResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Source of UTC wall-clock time.
pub trait Clock: Send + Sync {
    /// Current UTC time in epoch milliseconds.
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
            // Wall clock set before 1970.
            Err(_) => 0,
        }
    }
}

/// Manually driven clock for tests and deterministic replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Half-open UTC window `[start_ms, end_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl DateRange {
    /// Builds a range, rejecting inverted bounds.
    pub fn new(start_ms: i64, end_ms: i64) -> KanbanResult<Self> {
        if start_ms > end_ms {
            return Err(KanbanError::Validation(format!(
                "date range start {start_ms} is after end {end_ms}"
            )));
        }
        Ok(Self { start_ms, end_ms })
    }

    /// Seven-day window starting at `start_ms`.
    pub fn week_starting(start_ms: i64) -> Self {
        Self {
            start_ms,
            end_ms: start_ms.saturating_add(7 * DAY_MS),
        }
    }

    /// Range covering every representable timestamp.
    pub fn unbounded() -> Self {
        Self {
            start_ms: i64::MIN,
            end_ms: i64::MAX,
        }
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms < self.end_ms
    }

    pub fn is_empty(&self) -> bool {
        self.start_ms == self.end_ms
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, DateRange, ManualClock, DAY_MS};

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn range_is_half_open() {
        let range = DateRange::new(10, 20).unwrap();
        assert!(range.contains(10));
        assert!(range.contains(19));
        assert!(!range.contains(20));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(DateRange::new(20, 10).is_err());
        assert!(DateRange::new(5, 5).unwrap().is_empty());
    }

    #[test]
    fn week_covers_seven_days() {
        let week = DateRange::week_starting(0);
        assert_eq!(week.end_ms, 7 * DAY_MS);
    }
}
