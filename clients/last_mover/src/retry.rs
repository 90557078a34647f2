//! Poll pacing and rate-limit backoff as a plain state machine.
//!
//! ```text
//!   state      event                    next      effect
//!   Idle       begin (not suppressed)   Polling
//!   Polling    success                  Idle      errors -= 1 (saturating), backoff := active interval
//!   Polling    rate limited             Backoff   errors += 1, backoff := min(ceiling, base * errors)
//!   Polling    other failure            Idle
//!   Backoff    begin before deadline    Backoff   fetch suppressed
//!   Backoff    clock passes deadline    Idle      counter untouched
//! ```
//!
//! Backoff is linear in the error count, not exponential.

use std::time::Duration;

use crate::config::SyncConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Polling,
    /// Self-imposed pause until the given wall-clock millisecond.
    Backoff { until_ms: u64 },
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    state:              RetryState,
    consecutive_errors: u32,
    current_backoff:    Duration,
    base:               Duration,
    ceiling:            Duration,
    active_interval:    Duration,
    inactive_interval:  Duration,
}

impl RetryPolicy {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            state:              RetryState::Idle,
            consecutive_errors: 0,
            current_backoff:    config.active_interval(),
            base:               config.backoff_base(),
            ceiling:            config.backoff_ceiling(),
            active_interval:    config.active_interval(),
            inactive_interval:  config.inactive_interval(),
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// min(ceiling, base * errors)
    pub fn backoff_for(&self, errors: u32) -> Duration {
        self.base.saturating_mul(errors).min(self.ceiling)
    }

    /// Lift an expired pause. Called before every decision.
    fn tick(&mut self, now_ms: u64) {
        if let RetryState::Backoff { until_ms } = self.state {
            if now_ms >= until_ms {
                self.state = RetryState::Idle;
            }
        }
    }

    pub fn is_suppressed(&mut self, now_ms: u64) -> bool {
        self.tick(now_ms);
        matches!(self.state, RetryState::Backoff { .. })
    }

    pub fn remaining_backoff(&mut self, now_ms: u64) -> Option<Duration> {
        self.tick(now_ms);
        match self.state {
            RetryState::Backoff { until_ms } => {
                Some(Duration::from_millis(until_ms.saturating_sub(now_ms)))
            }
            _ => None,
        }
    }

    /// Start a fetch. Returns false while a backoff pause is in effect.
    pub fn begin(&mut self, now_ms: u64) -> bool {
        if self.is_suppressed(now_ms) {
            return false;
        }
        self.state = RetryState::Polling;
        true
    }

    pub fn on_success(&mut self) {
        self.consecutive_errors = self.consecutive_errors.saturating_sub(1);
        self.current_backoff = self.active_interval;
        if self.state == RetryState::Polling {
            self.state = RetryState::Idle;
        }
    }

    /// Record a throttled fetch and return the pause it imposes.
    pub fn on_rate_limited(&mut self, now_ms: u64) -> Duration {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        let delay = self.backoff_for(self.consecutive_errors);
        self.current_backoff = delay;
        self.state = RetryState::Backoff {
            until_ms: now_ms.saturating_add(delay.as_millis() as u64),
        };
        delay
    }

    pub fn on_failure(&mut self) {
        if self.state == RetryState::Polling {
            self.state = RetryState::Idle;
        }
    }

    /// How long to wait before the next poll.
    ///
    /// An active pause wins; after a pause, while errors are still on the
    /// books, the cadence stays at `max(last backoff, 2 * active)`; otherwise
    /// it follows the game's liveness.
    pub fn next_delay(&mut self, now_ms: u64, game_active: bool) -> Duration {
        if let Some(remaining) = self.remaining_backoff(now_ms) {
            return remaining;
        }
        if self.consecutive_errors > 0 {
            return self.current_backoff.max(self.active_interval.saturating_mul(2));
        }
        if game_active {
            self.active_interval
        } else {
            self.inactive_interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(&SyncConfig::default())
    }

    fn throttle(p: &mut RetryPolicy, now_ms: u64) -> Duration {
        assert!(p.begin(now_ms));
        p.on_rate_limited(now_ms)
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        let mut p = policy();
        let mut now = 0;
        let mut delays = Vec::new();
        for _ in 0..7 {
            let d = throttle(&mut p, now);
            delays.push(d.as_secs());
            now += d.as_millis() as u64;
        }
        assert_eq!(delays, vec![60, 120, 180, 240, 300, 300, 300]);
        assert_eq!(p.consecutive_errors(), 7);
    }

    #[test]
    fn success_forgives_one_error_at_a_time() {
        let mut p = policy();
        let mut now = 0;
        for _ in 0..3 {
            now += throttle(&mut p, now).as_millis() as u64;
        }
        assert_eq!(p.consecutive_errors(), 3);

        assert!(p.begin(now));
        p.on_success();
        assert_eq!(p.consecutive_errors(), 2);

        // next failure is the 3rd, not the 4th
        assert_eq!(throttle(&mut p, now), Duration::from_secs(180));
    }

    #[test]
    fn pause_suppresses_until_deadline() {
        let mut p = policy();
        let d = throttle(&mut p, 10 * SEC);
        assert_eq!(d, Duration::from_secs(60));
        assert_eq!(p.state(), RetryState::Backoff { until_ms: 70 * SEC });

        assert!(!p.begin(30 * SEC));
        assert_eq!(p.remaining_backoff(30 * SEC), Some(Duration::from_secs(40)));

        assert!(p.begin(70 * SEC));
        assert_eq!(p.state(), RetryState::Polling);
        // lifting the pause leaves the counter alone
        assert_eq!(p.consecutive_errors(), 1);
    }

    #[test]
    fn other_failures_do_not_back_off() {
        let mut p = policy();
        assert!(p.begin(0));
        p.on_failure();
        assert_eq!(p.state(), RetryState::Idle);
        assert_eq!(p.consecutive_errors(), 0);
        assert!(p.begin(0));
    }

    #[test]
    fn next_delay_tracks_liveness_and_backoff() {
        let mut p = policy();
        assert_eq!(p.next_delay(0, true), Duration::from_secs(60));
        assert_eq!(p.next_delay(0, false), Duration::from_secs(120));

        throttle(&mut p, 0);
        assert_eq!(p.next_delay(15 * SEC, true), Duration::from_secs(45));

        // pause over, error still counted: gentle cadence
        assert_eq!(p.next_delay(60 * SEC, false), Duration::from_secs(120));

        let mut now = 60 * SEC;
        now += throttle(&mut p, now).as_millis() as u64;
        now += throttle(&mut p, now).as_millis() as u64;
        assert_eq!(p.next_delay(now, true), Duration::from_secs(180));

        for _ in 0..3 {
            assert!(p.begin(now));
            p.on_success();
        }
        assert_eq!(p.consecutive_errors(), 0);
        assert_eq!(p.next_delay(now, true), Duration::from_secs(60));
    }
}
