//! Retry policy for reply attempts.
//!
//! Each attempt re-runs the whole reply pipeline. Between attempts the
//! driver waits a fixed delay. Terminal errors (bad key, unknown model,
//! wrong conversation kind) stop immediately.

use crate::error::ReplyError;
use groupclaw_config::TimingConfig;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
    /// `None` retries forever
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

    /// Fixed delay, at most `max_attempts` attempts (clamped to at least 1).
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Fixed delay, never gives up on retryable errors.
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// `max_attempts = 0` means unbounded.
    pub fn from_config(timing: &TimingConfig) -> Self {
        let delay = Duration::from_millis(timing.retry_delay_ms);
        match timing.max_attempts {
            0 => Self::unbounded(delay),
            n => Self::fixed(delay, n),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Decide after `attempt` (1-based) failed with `error`.
    pub fn decide(&self, attempt: u32, error: &ReplyError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp;
        }
        match self.max_attempts {
            Some(max) if attempt >= max => RetryDecision::GiveUp,
            _ => RetryDecision::RetryAfter(self.delay),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Self::DEFAULT_DELAY)
    }
}
