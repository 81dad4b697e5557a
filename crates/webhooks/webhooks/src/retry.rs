//! When a failed delivery is attempted again.
//!
//! `attempt` counts sends already made, starting at 1. The schedule answers
//! with the wait before the next send, or `None` once the webhook's
//! attempt budget is spent and the delivery should be marked failed.

use owner_core::{Backoff, RetryPolicy};
use std::time::Duration;

/// A webhook's [`RetryPolicy`] resolved into concrete durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    backoff: Backoff,
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl RetrySchedule {
    /// A policy with `max_attempts: 0` still allows the first send.
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self {
            backoff: policy.backoff,
            base: Duration::from_millis(policy.base_delay_ms),
            cap: Duration::from_millis(policy.max_delay_ms),
            max_attempts: policy.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let delay = match self.backoff {
            // base * 2^(attempt - 1)
            Backoff::Exponential => self
                .base
                .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1))),
            Backoff::Linear => self.base.saturating_mul(attempt.max(1)),
            Backoff::Fixed => self.base,
        };
        Some(delay.min(self.cap))
    }
}

impl From<&RetryPolicy> for RetrySchedule {
    fn from(policy: &RetryPolicy) -> Self {
        Self::from_policy(policy)
    }
}
