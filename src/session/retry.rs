//! Pure retry policy for the connect loop
//!
//! This module contains the retry budget and backoff calculation used by
//! [`crate::session::MqttSession::connect`], and the pure decision function
//! the loop consults after every failed attempt.

use crate::error::{SessionError, SessionResult};
use std::time::Duration;

/// Default number of connect attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default fixed delay between connect attempts
pub const DEFAULT_BACKOFF_MS: u64 = 1000;

/// Retry policy for the bounded connect loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of connect attempts, including the first
    pub max_attempts: u32,
    /// Custom backoff pattern in milliseconds (if empty, uses the sustained delay)
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after the pattern is exhausted
    pub sustained_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_pattern: Vec::new(),
            sustained_delay_ms: DEFAULT_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff_pattern: Vec::new(),
            sustained_delay_ms: delay.as_millis() as u64,
        }
    }

    /// No delay at all between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Calculate backoff delay after the given failed attempt (1-based)
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay_ms)
    }

    /// Worst-case time spent sleeping before the budget is exhausted.
    /// No delay follows the final attempt.
    pub fn calculate_max_total_delay(&self) -> Duration {
        let total: u64 = (1..self.max_attempts)
            .map(|attempt| self.calculate_backoff_delay(attempt))
            .sum();
        Duration::from_millis(total)
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.max_attempts == 0 {
            return Err(SessionError::invalid_params(
                "retry max_attempts must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Decide what to do after `failed_attempts` attempts failed (pure function)
    pub fn next_step(&self, failed_attempts: u32, cancel_requested: bool) -> RetryDecision {
        if failed_attempts >= self.max_attempts {
            return RetryDecision::AbortMaxAttemptsExceeded;
        }
        if cancel_requested {
            return RetryDecision::AbortCancelled;
        }
        RetryDecision::Proceed {
            attempt: failed_attempts + 1,
            delay_ms: self.calculate_backoff_delay(failed_attempts),
        }
    }
}

/// Decision result for the next connect attempt
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep `delay_ms`, then make attempt number `attempt`
    Proceed { attempt: u32, delay_ms: u64 },
    /// Stop - the caller asked to cancel
    AbortCancelled,
    /// Stop - the retry budget is spent
    AbortMaxAttemptsExceeded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert!(policy.backoff_pattern.is_empty());
        assert_eq!(policy.sustained_delay_ms, 1000);
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let policy = RetryPolicy {
            max_attempts: 6,
            backoff_pattern: vec![25, 50, 100],
            sustained_delay_ms: 250,
        };

        assert_eq!(policy.calculate_backoff_delay(1), 25);
        assert_eq!(policy.calculate_backoff_delay(2), 50);
        assert_eq!(policy.calculate_backoff_delay(3), 100);

        // Sustained delay after pattern exhausted
        assert_eq!(policy.calculate_backoff_delay(4), 250);
        assert_eq!(policy.calculate_backoff_delay(100), 250);
    }

    #[test]
    fn test_fixed_delay_is_not_exponential() {
        let policy = RetryPolicy::default();
        for attempt in 1..=10 {
            assert_eq!(policy.calculate_backoff_delay(attempt), 1000);
        }
    }

    #[test]
    fn test_calculate_max_total_delay() {
        // Nine sleeps between ten attempts
        assert_eq!(
            RetryPolicy::default().calculate_max_total_delay(),
            Duration::from_millis(9000)
        );
        assert_eq!(
            RetryPolicy::immediate(10).calculate_max_total_delay(),
            Duration::ZERO
        );
        assert_eq!(
            RetryPolicy::fixed(1, Duration::from_secs(5)).calculate_max_total_delay(),
            Duration::ZERO
        );
    }

    #[test]
    fn test_next_step() {
        let policy = RetryPolicy::default();

        assert_eq!(
            policy.next_step(1, false),
            RetryDecision::Proceed {
                attempt: 2,
                delay_ms: 1000
            }
        );
        assert_eq!(policy.next_step(3, true), RetryDecision::AbortCancelled);
        assert_eq!(
            policy.next_step(10, false),
            RetryDecision::AbortMaxAttemptsExceeded
        );
        // Exhaustion wins over cancellation
        assert_eq!(
            policy.next_step(10, true),
            RetryDecision::AbortMaxAttemptsExceeded
        );
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert!(RetryPolicy::immediate(1).validate().is_ok());
        assert!(RetryPolicy::immediate(0).validate().is_err());
    }
}
