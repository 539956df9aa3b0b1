// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock port used for staleness decisions and snapshot timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually advanced clock for tests and replay tooling.
#[derive(Debug)]
pub struct FixedClock {
    unix_secs: AtomicU64,
}

impl FixedClock {
    #[must_use]
    pub fn at(time: SystemTime) -> Self {
        Self {
            unix_secs: AtomicU64::new(unix_seconds(time)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.unix_secs.fetch_add(by.as_secs(), Ordering::SeqCst);
    }

    /// Moves the clock to `time`, truncated to whole seconds.
    pub fn set(&self, time: SystemTime) {
        self.unix_secs.store(unix_seconds(time), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.unix_secs.load(Ordering::SeqCst))
    }
}

#[must_use]
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_in_whole_seconds() {
        let clock = FixedClock::at(UNIX_EPOCH + Duration::from_secs(1_000));
        clock.advance(Duration::from_secs(86_400));
        assert_eq!(unix_seconds(clock.now()), 87_400);
        clock.set(UNIX_EPOCH + Duration::from_millis(5_900));
        assert_eq!(unix_seconds(clock.now()), 5);
    }
}
