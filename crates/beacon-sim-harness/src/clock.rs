//! Virtual time.
//!
//! The [`VirtualClock`] is the only time source a simulated node sees. It
//! moves when the harness says so and never on its own.
use parking_lot::Mutex;

use beacon_sim_core::error::ClockError;
use beacon_sim_core::traits::TimeSource;

#[derive(Debug)]
struct ClockState {
    now: u64,
    sealed: bool,
}

/// A settable millisecond timestamp.
///
/// Before [`seal`](VirtualClock::seal) the clock may be set freely, which is
/// how a session primes it just before genesis. Once sealed it only moves
/// forward.
#[derive(Debug)]
pub struct VirtualClock {
    state: Mutex<ClockState>,
}

impl VirtualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            state: Mutex::new(ClockState {
                now: start_millis,
                sealed: false,
            }),
        }
    }

    pub fn now(&self) -> u64 {
        self.state.lock().now
    }

    /// Set the clock to `millis`.
    ///
    /// Fails with [`ClockError::Rewind`] when sealed and `millis` is in the past.
    pub fn advance_to(&self, millis: u64) -> Result<(), ClockError> {
        let mut state = self.state.lock();
        if state.sealed && millis < state.now {
            return Err(ClockError::Rewind {
                current: state.now,
                requested: millis,
            });
        }
        state.now = millis;
        Ok(())
    }

    /// Freeze the timeline against rewinds. Idempotent.
    pub fn seal(&self) {
        self.state.lock().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }
}

impl TimeSource for VirtualClock {
    fn now_millis(&self) -> u64 {
        self.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_at_given_time() {
        let clock = VirtualClock::new(42);
        assert_eq!(clock.now(), 42);
        assert_eq!(clock.now_millis(), 42);
        assert!(!clock.is_sealed());
    }

    #[test]
    fn rewind_allowed_before_seal() {
        let clock = VirtualClock::new(1_000);
        clock.advance_to(10).unwrap();
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn rewind_rejected_after_seal() {
        let clock = VirtualClock::new(1_000);
        clock.seal();
        assert_eq!(
            clock.advance_to(999),
            Err(ClockError::Rewind { current: 1_000, requested: 999 })
        );
        assert_eq!(clock.now(), 1_000);
    }

    #[test]
    fn same_time_is_not_a_rewind() {
        let clock = VirtualClock::new(5);
        clock.seal();
        clock.advance_to(5).unwrap();
        clock.advance_to(6).unwrap();
        assert_eq!(clock.now(), 6);
    }

    proptest! {
        #[test]
        fn sealed_clock_never_decreases(steps in proptest::collection::vec(0u64..10_000, 1..50)) {
            let clock = VirtualClock::new(0);
            clock.seal();
            let mut high = 0;
            for t in steps {
                let before = clock.now();
                let result = clock.advance_to(t);
                prop_assert_eq!(result.is_ok(), t >= before);
                high = high.max(t);
                prop_assert_eq!(clock.now(), high);
            }
        }
    }
}
