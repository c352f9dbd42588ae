//! Bounded exponential backoff
//!
//! Shared by the connection manager (reconnect attempts) and the lifecycle
//! manager (backend startup retries). Every loop driven by a policy has a
//! hard attempt ceiling.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with an attempt ceiling
///
/// # Example
/// ```
/// use forest_core::BackoffPolicy;
///
/// let policy = BackoffPolicy::new()
///     .with_max_attempts(5)
///     .with_base_delay_ms(100)
///     .with_max_delay_ms(1_000);
/// // base × 2^(attempt − 1), capped
/// assert_eq!(policy.delay_for_attempt(1).as_millis(), 100);
/// assert_eq!(policy.delay_for_attempt(3).as_millis(), 400);
/// assert_eq!(policy.delay_for_attempt(5).as_millis(), 1_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (0 = never attempt)
    pub max_attempts: u32,
    /// Delay before the first attempt in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Set the attempt ceiling
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base delay
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the delay cap
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay before the given 1-based attempt: `base × 2^(attempt − 1)`, capped.
    ///
    /// Attempt 0 has no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        // Cap the shift to prevent overflow (1 << 63 is the max for u64)
        let shift = (attempt - 1).min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// True once `attempts` has reached the ceiling
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
