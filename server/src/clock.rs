//! Time source for the ramps and the log.
//!
//! All waiting in the controllers goes through [`Clock::sleep`] so that tests can run a
//! multi-minute field ramp in microseconds with a [`ManualClock`].

use std::{
    cell::{Cell, RefCell},
    thread,
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};

/// Source of wall-clock time and of blocking waits.
pub trait Clock {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

/// A clock that never blocks. Sleeping advances its time and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
    sleeps: RefCell<Vec<Duration>>,
}

impl ManualClock {
    /// Start the clock at the given time.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Cell::new(start),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }

    /// Sum of all sleeps requested so far.
    pub fn total_slept(&self) -> Duration {
        self.sleeps.borrow().iter().sum()
    }

    /// Move the time forward without recording a sleep, e.g., to space log samples.
    pub fn advance(&self, duration: Duration) {
        let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        self.now.set(self.now.get() + delta);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::starting_at(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::default();
        clock.sleep(Duration::from_secs(40));
        clock.sleep(Duration::from_millis(500));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(40), Duration::from_millis(500)]
        );
        assert_eq!(clock.total_slept(), Duration::from_millis(40_500));
        assert_eq!(
            clock.now() - DateTime::<Utc>::UNIX_EPOCH,
            TimeDelta::milliseconds(40_500)
        );
    }

    #[test]
    fn test_manual_clock_advance_is_not_a_sleep() {
        let clock = ManualClock::default();
        clock.advance(Duration::from_secs(1));
        assert!(clock.sleeps().is_empty());
        assert_eq!(clock.now(), DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(1));
    }
}
