//! # Decode Trigger
//!
//! Scheduling policy for when a buffered window goes to the speech model:
//! at most once per fixed interval, and only once a minimum duration of
//! audio has accumulated (bursty low-bitrate input would otherwise produce
//! windows too short to decode usefully).
//!
//! The clock is passed in by the caller, which keeps the policy a pure
//! state machine and the interval/minimum properties directly testable.

use std::time::{Duration, Instant};

/// Interval- and duration-gated decode trigger.
#[derive(Debug)]
pub struct DecodeTrigger {
    /// Minimum time between decode firings
    interval: Duration,

    /// Minimum buffered audio before the first firing is allowed
    min_buffer: Duration,

    /// When the trigger last fired (initialized to creation time, so the
    /// first window also waits a full interval)
    last_fired: Instant,
}

impl DecodeTrigger {
    pub fn new(interval: Duration, min_buffer: Duration, now: Instant) -> Self {
        Self {
            interval,
            min_buffer,
            last_fired: now,
        }
    }

    /// Evaluate the trigger after an append.
    ///
    /// Returns true when a decode should run, and advances `last_fired`
    /// immediately so the trigger cannot fire again within the interval no
    /// matter how long the decode itself takes or how fast messages arrive.
    pub fn should_fire(&mut self, buffered: Duration, now: Instant) -> bool {
        if now.duration_since(self.last_fired) < self.interval {
            return false;
        }
        if buffered < self.min_buffer {
            return false;
        }
        self.last_fired = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn never_fires_before_minimum_duration() {
        let start = Instant::now();
        let mut trigger = DecodeTrigger::new(secs(6), secs(2), start);

        // Interval elapsed, but only one second buffered.
        assert!(!trigger.should_fire(secs(1), start + secs(10)));
    }

    #[test]
    fn never_fires_before_the_interval() {
        let start = Instant::now();
        let mut trigger = DecodeTrigger::new(secs(6), secs(2), start);

        // Plenty buffered, but only three seconds elapsed.
        assert!(!trigger.should_fire(secs(30), start + secs(3)));
    }

    #[test]
    fn fires_at_most_once_per_interval() {
        let start = Instant::now();
        let mut trigger = DecodeTrigger::new(secs(6), secs(2), start);

        assert!(trigger.should_fire(secs(6), start + secs(6)));
        // Immediately after firing, nothing regardless of arrival rate.
        assert!(!trigger.should_fire(secs(6), start + secs(6)));
        assert!(!trigger.should_fire(secs(6), start + secs(11)));
        // Next interval boundary fires again.
        assert!(trigger.should_fire(secs(6), start + secs(12)));
    }
}
