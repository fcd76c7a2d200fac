//! Last-activity tracking for the inactivity power-down

use embassy_time::{Duration, Instant};
use portable_atomic::{AtomicU64, Ordering};

/// Monotonic timestamp of the last user or recording activity, in microseconds
pub struct ActivityClock {
    last_active_us: AtomicU64,
}

impl ActivityClock {
    pub const fn new() -> Self {
        Self {
            last_active_us: AtomicU64::new(0),
        }
    }

    /// Mark now as active
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, at: Instant) {
        self.last_active_us.store(at.as_micros(), Ordering::Release);
    }

    pub fn last_active(&self) -> Instant {
        Instant::from_micros(self.last_active_us.load(Ordering::Acquire))
    }

    /// Time since the last activity, zero if `now` is earlier
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.checked_duration_since(self.last_active())
            .unwrap_or(Duration::from_ticks(0))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}
