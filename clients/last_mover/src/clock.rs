use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock reading injected into the controller so the retry policy and
/// the countdown can be driven by tests without real timers.
pub trait TimeSource: Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    fn unix_seconds(&self) -> i64 {
        (self.now_ms() / 1_000) as i64
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) use manual::ManualClock;
