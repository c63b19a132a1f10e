use chrono::{DateTime, Duration, Utc};

/// Source of "now" for timestamps on snapshots, invitations and reports.
///
/// Services take a `Clock` so tests can pin time without touching the system
/// clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Moves a fixed clock forward. No effect on the system clock.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// Returns a copy of this clock moved forward by `delta`.
    #[must_use]
    pub fn advanced(mut self, delta: Duration) -> Self {
        self.advance(delta);
        self
    }
}

/// Seconds since the epoch used by `fixed_now` (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Deterministic timestamp for tests.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(FIXED_TEST_TIMESTAMP)
}

/// A `Clock` pinned at `fixed_now`.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = fixed_clock().advanced(Duration::hours(2));
        assert_eq!(clock.now(), fixed_now() + Duration::hours(2));
        assert_eq!(fixed_now().timestamp(), FIXED_TEST_TIMESTAMP);
    }

    #[test]
    fn system_clock_ignores_advance() {
        let mut clock = Clock::system();
        clock.advance(Duration::days(1));
        assert_eq!(clock, Clock::System);
    }
}
