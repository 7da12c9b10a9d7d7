//! Retry budget and exponential backoff schedule
//!
//! Every engine failure inside an attempt is treated as transient: the
//! dispatcher sleeps and re-invokes the engine until the budget runs out.
//! The schedule is deterministic — `backoff_base * 2^attempt` — so with the
//! default one-second base, failed attempts 1, 2, and 3 are followed by
//! delays of 2, 4, and 8 seconds, and a fourth failure is final.

use std::time::Duration;

use crate::config::RetryConfig;

/// Shift cap keeping `2^attempt` inside u32 range for absurd attempt counts
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Retry policy derived from [`RetryConfig`]
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_base: Duration,
}

impl RetryPolicy {
    /// Build a policy from configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.backoff_base,
        }
    }

    /// Backoff delay after failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_SHIFT);
        self.backoff_base.saturating_mul(factor)
    }

    /// True when failed attempt `attempt` (1-based) was the final permitted one
    pub fn is_final_attempt(&self, attempt: u32) -> bool {
        attempt > self.max_retries
    }

    /// The configured retry count (attempts allowed = retries + 1)
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
