//! Wall Clock
//!
//! The synchronizer schedules user directory refreshes and unchanged-period
//! timeouts against this clock instead of calling `Utc::now()` directly.

use chrono::{DateTime, Utc};

/// Source of the current instant.
///
/// ```ignore
/// use bridge_traits::time::Clock;
///
/// fn deadline_passed(clock: &dyn Clock, deadline: DateTime<Utc>) -> bool {
///     clock.now() > deadline
/// }
/// ```
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the host's UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
