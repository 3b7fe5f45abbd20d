//! Wall-clock abstraction.
//!
//! Token freshness, order age and piece-hash age all compare against "now".
//! Reading it through [`PhysicalClock`] lets tests move time explicitly;
//! deterministic clocks live in `strata-testkit`.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait PhysicalClock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock
    pub fn new() -> Self {
        Self
    }
}

impl PhysicalClock for SystemClock {
    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> DateTime<Utc> {
        // Utc::now() is allowed only in the production clock.
        Utc::now()
    }
}

impl<C: PhysicalClock + ?Sized> PhysicalClock for std::sync::Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
