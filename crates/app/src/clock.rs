//! Time source

use std::{
    fmt::Debug,
    sync::{Mutex, PoisonError},
};

use jiff::{SignedDuration, Timestamp};

/// Supplies the current instant to services that reason about windows and expiry.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Timestamp;
}

/// `at` shifted by `minutes`, clamped to the representable range.
#[must_use]
pub fn shift_minutes(at: Timestamp, minutes: i64) -> Timestamp {
    let fallback = if minutes < 0 {
        Timestamp::MIN
    } else {
        Timestamp::MAX
    };

    at.saturating_add(SignedDuration::from_mins(minutes))
        .unwrap_or(fallback)
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward, for negative durations).
    pub fn advance(&self, by: SignedDuration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);

        *now = now.saturating_add(by).unwrap_or(*now);
    }

    pub fn set(&self, to: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_by_the_given_duration() {
        let start = Timestamp::UNIX_EPOCH;
        let clock = ManualClock::new(start);

        clock.advance(SignedDuration::from_mins(15));

        assert_eq!(
            clock.now().duration_since(start),
            SignedDuration::from_mins(15),
            "clock should have moved exactly fifteen minutes"
        );
    }

    #[test]
    fn shift_minutes_moves_both_ways() {
        let start = Timestamp::UNIX_EPOCH;

        assert_eq!(shift_minutes(start, 60).as_second(), 3_600);
        assert_eq!(shift_minutes(start, -60).as_second(), -3_600);
        assert_eq!(shift_minutes(Timestamp::MAX, 1), Timestamp::MAX);
    }

    #[test]
    fn manual_clock_can_be_reset() {
        let clock = ManualClock::new(Timestamp::UNIX_EPOCH);
        let later = Timestamp::from_second(3_600).unwrap_or(Timestamp::UNIX_EPOCH);

        clock.set(later);

        assert_eq!(clock.now(), later);
    }
}
