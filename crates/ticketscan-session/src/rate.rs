// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Timestamp-gated rate limiter. Frames that arrive before the next eligible
// tick are dropped by the caller, never queued.

use std::time::Duration;

use tokio::time::Instant;

/// Admits at most one event per `interval` of wall-clock time.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Admit the event at `now` if a full interval has passed since the last
    /// admitted one. The first event is always admitted.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        let ready = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            self.last = Some(now);
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(200);

    #[test]
    fn first_event_is_admitted() {
        let mut limiter = RateLimiter::new(TICK);
        assert!(limiter.try_acquire(Instant::now()));
    }

    #[test]
    fn thirty_hz_source_is_thinned_to_five_hz() {
        let mut limiter = RateLimiter::new(TICK);
        let start = Instant::now();
        // One second of frames at ~30 Hz.
        let admitted = (0..30)
            .map(|i| start + Duration::from_micros(33_334 * i))
            .filter(|t| limiter.try_acquire(*t))
            .count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn early_events_are_dropped_not_deferred() {
        let mut limiter = RateLimiter::new(TICK);
        let t0 = Instant::now();
        assert!(limiter.try_acquire(t0));
        assert!(!limiter.try_acquire(t0 + Duration::from_millis(150)));
        // The rejected event did not push the next tick back.
        assert!(limiter.try_acquire(t0 + TICK));
    }

    #[test]
    fn zero_interval_admits_everything() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(limiter.try_acquire(t0));
        assert!(limiter.try_acquire(t0));
    }
}
