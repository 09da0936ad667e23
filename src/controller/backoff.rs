//! # Requeue Backoff
//!
//! Fibonacci backoff for FailoverSchemes that end up FAILED or whose
//! reconcile returns an error. Steps are counted in minutes and handed to
//! the controller as `Duration`s.
//!
//! With the default bounds the sequence is 1m, 1m, 2m, 3m, 5m, 8m, 10m.
//!
//! ```rust
//! use failover_controller::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 120);
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Fibonacci sequence in minutes, capped at `max_minutes`
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// `min_minutes` is used for the first two steps. A `max_minutes` below
    /// the minimum is raised to it.
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        let min_minutes = min_minutes.max(1);
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes: max_minutes.max(min_minutes),
        }
    }

    /// Current step in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result_seconds = self.current_minutes * 60;
        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next_minutes.min(self.max_minutes);
        result_seconds
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

/// Backoff plus the number of consecutive failures it has seen
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
    /// Earliest time the next attempt should run
    pub retry_at: Option<Instant>,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
            retry_at: None,
        }
    }
}

/// Independent backoff state per FailoverScheme, keyed by `namespace/name`
#[derive(Debug)]
pub struct RequeueBackoffs {
    min_minutes: u64,
    max_minutes: u64,
    states: Mutex<HashMap<String, BackoffState>>,
}

impl RequeueBackoffs {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            max_minutes,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure for `key` and return the delay before the next
    /// attempt together with the consecutive failure count.
    pub fn next(&self, key: &str) -> (Duration, u32) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(key.to_string())
            .or_insert_with(|| BackoffState::new(self.min_minutes, self.max_minutes));
        state.error_count += 1;
        let delay = state.backoff.next_backoff();
        state.retry_at = Some(Instant::now() + delay);
        (delay, state.error_count)
    }

    /// Time left until the scheduled retry for `key`, if one is still ahead
    #[must_use]
    pub fn remaining(&self, key: &str) -> Option<Duration> {
        self.remaining_at(key, Instant::now())
    }

    /// Time left at `now` until the scheduled retry for `key`
    #[must_use]
    pub fn remaining_at(&self, key: &str, now: Instant) -> Option<Duration> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let retry_at = states.get(key)?.retry_at?;
        retry_at
            .checked_duration_since(now)
            .filter(|left| !left.is_zero())
    }

    /// Forget the failures recorded for `key`
    pub fn reset(&self, key: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    #[must_use]
    pub fn error_count(&self, key: &str) -> u32 {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |state| state.error_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_caps_at_max() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        let steps: Vec<u64> = (0..9).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(steps, vec![60, 60, 120, 180, 300, 480, 600, 600, 600]);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn test_inverted_bounds_are_clamped() {
        let mut backoff = FibonacciBackoff::new(5, 2);
        assert_eq!(backoff.next_backoff_seconds(), 300);
        assert_eq!(backoff.next_backoff_seconds(), 300);

        let mut zero = FibonacciBackoff::new(0, 0);
        assert_eq!(zero.next_backoff_seconds(), 60);
    }

    #[test]
    fn test_per_scheme_state_is_independent() {
        let backoffs = RequeueBackoffs::new(1, 10);

        assert_eq!(backoffs.next("fed/a"), (Duration::from_secs(60), 1));
        assert_eq!(backoffs.next("fed/a"), (Duration::from_secs(60), 2));
        assert_eq!(backoffs.next("fed/a"), (Duration::from_secs(120), 3));
        assert_eq!(backoffs.next("fed/b"), (Duration::from_secs(60), 1));

        assert!(backoffs.remaining("fed/a").is_some());
        assert!(backoffs.remaining("fed/c").is_none());

        backoffs.reset("fed/a");
        assert!(backoffs.remaining("fed/a").is_none());
        assert_eq!(backoffs.error_count("fed/a"), 0);
        assert_eq!(backoffs.error_count("fed/b"), 1);
        assert_eq!(backoffs.next("fed/a"), (Duration::from_secs(60), 1));
    }
}
