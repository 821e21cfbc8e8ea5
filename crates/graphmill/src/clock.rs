use core::time::Duration;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Custom epoch: Wednesday, January 1, 2025 00:00:00 UTC
pub const CUSTOM_EPOCH: Duration = Duration::from_millis(1_735_689_600_000);

/// A trait for time sources that return a monotonic or wall-clock timestamp.
///
/// This abstraction allows plugging in a real clock or a mocked time source
/// in tests. The unit is **milliseconds** relative to a configurable origin.
pub trait TimeSource: Send + Sync {
    /// Returns the current time in milliseconds since the configured epoch.
    fn current_millis(&self) -> u64;
}

/// A monotonic time source that returns elapsed time since construction,
/// offset from a user-defined epoch.
///
/// This avoids wall-clock adjustments (e.g., NTP corrections) while still
/// aligning timestamps to a fixed origin: the offset between the wall clock
/// and the epoch is captured once, and the elapsed time is measured with
/// [`Instant`].
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    start: Instant,
    epoch_offset: u64, // in milliseconds
}

impl Default for MonotonicClock {
    /// Constructs a monotonic clock aligned to [`CUSTOM_EPOCH`].
    fn default() -> Self {
        Self::with_epoch(CUSTOM_EPOCH)
    }
}

impl MonotonicClock {
    /// Constructs a monotonic clock using `epoch` (a duration since
    /// 1970-01-01 UTC) as t = 0.
    ///
    /// A wall clock earlier than `epoch` starts the clock at zero.
    pub fn with_epoch(epoch: Duration) -> Self {
        let offset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|now| now.checked_sub(epoch))
            .unwrap_or_default();

        Self {
            start: Instant::now(),
            epoch_offset: u64::try_from(offset.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl TimeSource for MonotonicClock {
    fn current_millis(&self) -> u64 {
        let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_offset.saturating_add(elapsed)
    }
}
