//! Deterministic wall clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use strata_core::PhysicalClock;

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ControllableClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ControllableClock {
    /// Clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Clock frozen at 2024-01-01T00:00:00Z.
    pub fn fixed() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to `to`.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ControllableClock {
    fn default() -> Self {
        Self::fixed()
    }
}

impl PhysicalClock for ControllableClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_moves_only_when_told() {
        let clock = ControllableClock::fixed();
        let start = clock.now();
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(5));

        // clones share the same time
        let other = clock.clone();
        other.set(start);
        assert_eq!(clock.now(), start);
    }
}
