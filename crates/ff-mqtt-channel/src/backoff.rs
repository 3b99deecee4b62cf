//! Exponential reconnect backoff.
//!
//! Delays start at the policy's base delay and double after every attempt,
//! capped at the max delay. A connection that stayed up for at least the
//! stable-connection duration resets the next delay to base; a connection
//! that dropped sooner keeps climbing from where it left off.

use std::time::Duration;

use crate::config::ReconnectPolicy;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    stable: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: &ReconnectPolicy) -> Self {
        let base = policy.base_delay();
        Self {
            base,
            max: policy.max_delay().max(base),
            stable: policy.stable_connection(),
            current: base,
            attempts: 0,
        }
    }

    /// Delay to wait before the next reconnect attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Record how long the previous connection lasted before it dropped.
    pub fn connection_ended(&mut self, lifetime: Duration) {
        if lifetime >= self.stable {
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.attempts = 0;
    }

    /// Attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
