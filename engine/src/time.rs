use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

/// An opaque representation of a game time instant.
///
/// The unit of time is a millisecond of game tick time.
#[derive(
    Copy,
    Clone,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Debug,
    Serialize,
    Deserialize,
)]
pub struct Instant(pub(crate) i64);

impl Instant {
    pub const fn from_millis(ms: i64) -> Self {
        Instant(ms)
    }

    pub const fn millis(self) -> i64 {
        self.0
    }

    /// Whole game seconds, the unit time events are scheduled in.
    pub const fn second(self) -> u32 {
        if self.0 < 0 {
            0
        } else {
            (self.0 / 1000) as u32
        }
    }
}

impl std::ops::Add<i64> for Instant {
    type Output = Self;

    fn add(self, rhs: i64) -> Self::Output {
        Instant(self.0 + rhs)
    }
}

impl std::ops::AddAssign<i64> for Instant {
    fn add_assign(&mut self, rhs: i64) {
        self.0 += rhs;
    }
}

impl std::ops::Sub<Instant> for Instant {
    type Output = i64;

    fn sub(self, rhs: Instant) -> Self::Output {
        self.0 - rhs.0
    }
}

impl std::ops::Sub<i64> for Instant {
    type Output = Self;

    fn sub(self, rhs: i64) -> Self::Output {
        Instant(self.0 - rhs)
    }
}

/// Source of game time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock time since the clock was created.
pub struct SystemClock(std::time::Instant);

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock(std::time::Instant::now())
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant(self.0.elapsed().as_millis() as i64)
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: Instant) -> Self {
        ManualClock(AtomicI64::new(now.0))
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, now: Instant) {
        self.0.store(now.0, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant(self.0.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn manual_clock() {
        let clock = ManualClock::new(Instant::from_millis(500));
        assert_eq!(clock.now().second(), 0);
        clock.advance(2_600);
        assert_eq!(clock.now(), Instant(3_100));
        assert_eq!(clock.now().second(), 3);
        assert_eq!(clock.now() - Instant(100), 3_000);
    }

    #[test]
    fn seconds_floor_at_zero() {
        const START: u32 = Instant::from_millis(-2_500).second();
        assert_eq!(START, 0);
        assert_eq!(Instant::from_millis(999).second(), 0);
        assert_eq!(Instant::from_millis(61_000).second(), 61);
    }
}
