//! Quantum alignment for inexact repeating alarms.
//!
//! Unrelated periodic alarms that share a quantum-multiple interval are
//! slipped forward onto the same elapsed-timebase boundaries so they fire
//! in the same wake cycle. Alignment is applied once, at schedule time.

use alarmd_core::ClockClass;

/// Aligns inexact repeating trigger times to a fixed quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentPolicy {
    quantum: i64,
}

impl AlignmentPolicy {
    /// `quantum` must be positive; config validation guarantees this.
    pub fn new(quantum: i64) -> Self {
        debug_assert!(quantum > 0);
        Self {
            quantum: quantum.max(1),
        }
    }

    pub fn quantum(&self) -> i64 {
        self.quantum
    }

    /// Whether `interval` is worth aligning at all.
    pub fn is_aligned_interval(&self, interval: i64) -> bool {
        interval > 0 && interval % self.quantum == 0
    }

    /// Compute the trigger time to schedule for an inexact request.
    ///
    /// `skew` converts wall-clock into elapsed time (`elapsed = wall - skew`)
    /// and is ignored for elapsed classes. The result is in the same timebase
    /// as `requested` and is never earlier than it.
    pub fn align(&self, requested: i64, interval: i64, class: ClockClass, skew: i64) -> i64 {
        if !self.is_aligned_interval(interval) {
            return requested;
        }

        let skew = if class.is_wall_clock() { skew } else { 0 };
        let offset = requested.wrapping_sub(skew).rem_euclid(self.quantum);
        if offset == 0 {
            requested
        } else {
            requested.saturating_add(self.quantum - offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q: i64 = 15 * 60 * 1000;
    const MINUTE: i64 = 60 * 1000;

    fn policy() -> AlignmentPolicy {
        AlignmentPolicy::new(Q)
    }

    #[test]
    fn non_quantum_interval_is_exact() {
        assert_eq!(policy().align(1_234, 1_000, ClockClass::Elapsed, 0), 1_234);
        assert_eq!(policy().align(1_234, Q + 1, ClockClass::Elapsed, 0), 1_234);
        assert_eq!(policy().align(1_234, 0, ClockClass::Elapsed, 0), 1_234);
    }

    #[test]
    fn five_minutes_past_boundary_goes_to_next_boundary() {
        let boundary = 40 * Q;
        let requested = boundary + 5 * MINUTE;
        let aligned = policy().align(requested, Q, ClockClass::ElapsedWakeup, 0);
        assert_eq!(aligned, boundary + Q);
        assert_eq!(aligned - requested, 10 * MINUTE);
    }

    #[test]
    fn on_boundary_is_unchanged() {
        assert_eq!(policy().align(7 * Q, 2 * Q, ClockClass::Elapsed, 0), 7 * Q);
    }

    #[test]
    fn wall_clock_aligns_in_elapsed_timebase() {
        let skew = 1_700_000_000_000;
        // Elapsed equivalent is 3 minutes past a boundary.
        let requested = skew + 12 * Q + 3 * MINUTE;
        let aligned = policy().align(requested, Q, ClockClass::RtcWakeup, skew);
        assert_eq!(aligned, skew + 13 * Q);
        assert_eq!((aligned - skew) % Q, 0);
    }

    #[test]
    fn skew_ignored_for_elapsed_classes() {
        let aligned = policy().align(Q + 1, Q, ClockClass::Elapsed, 12_345);
        assert_eq!(aligned, 2 * Q);
    }

    #[test]
    fn negative_times_round_forward() {
        let aligned = policy().align(-5 * MINUTE, Q, ClockClass::Elapsed, 0);
        assert_eq!(aligned, 0);
    }

    #[test]
    fn aligned_never_earlier_and_on_boundary() {
        let p = policy();
        let skew = 987_654_321;
        for i in 0..200i64 {
            let requested = i * 7_919_113 - 50 * Q;
            for class in ClockClass::ALL {
                let aligned = p.align(requested, 4 * Q, class, skew);
                assert!(aligned >= requested);
                assert!(aligned - requested < Q);
                let base = if class.is_wall_clock() { skew } else { 0 };
                assert_eq!((aligned - base).rem_euclid(Q), 0);
            }
        }
    }
}
