//! Reconnect policies consulted after a transport failure.
//!
//! The bridge never reconnects on its own. A policy only tells it how long to
//! wait before re-dispatching a connect action through the host; returning
//! `None` leaves the bridge disconnected.

use std::time::Duration;

pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
pub const MAX_RETRY_ATTEMPTS: u32 = 10;
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

pub trait ReconnectPolicy: Send + Sync {
    /// Delay before reconnect attempt number `attempt` (0-based), or `None`
    /// to stay disconnected.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Stay disconnected until the host asks again.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReconnect;

impl ReconnectPolicy for NeverReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Exponential backoff with a delay cap and a bounded number of attempts.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub multiplier: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: INITIAL_RETRY_DELAY_MS,
            max_delay_ms: MAX_RETRY_DELAY_MS,
            max_attempts: MAX_RETRY_ATTEMPTS,
            multiplier: BACKOFF_MULTIPLIER,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let delay = (self.initial_delay_ms as f64) * self.multiplier.powi(attempt as i32);
        let delay = delay.min(self.max_delay_ms as f64) as u64;
        Some(Duration::from_millis(delay))
    }
}
