// Monotonic-enough time source, swappable so tests drive ticks by hand.
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock used by the running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-advanced clock. Tick bodies take no time arguments, so tests (and
/// time-scaled demos) advance this and call the tick methods directly.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn starting_at(t: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(t)) }
    }

    /// Epoch start; good enough when only deltas matter.
    pub fn epoch() -> Self {
        Self::starting_at(DateTime::UNIX_EPOCH)
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock();
        *now += delta;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(TimeDelta::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::epoch();
        let t0 = clock.now();
        clock.advance_secs(30);
        assert_eq!((clock.now() - t0).num_seconds(), 30);
    }
}
