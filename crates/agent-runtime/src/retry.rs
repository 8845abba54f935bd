//! Retry budgets with exponential backoff
//!
//! Transport failures and timeouts are retried from separate budgets; the
//! delay between attempts follows a [`RetryPolicy`].

use agent_core::Error;
use std::time::Duration;

/// Backoff between retried attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Upper bound for any single delay
    pub max_backoff: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(initial_backoff: Duration, max_backoff: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Retry without waiting
    pub fn immediate() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        }
    }

    /// Delay before retry number `retry` (1-based); zero for `retry == 0`
    pub fn backoff_duration(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi((retry - 1) as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);

        backoff.min(self.max_backoff)
    }
}

/// Remaining retries of one call, tracked per failure class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    transport: u32,
    timeout: u32,
    used: u32,
}

impl RetryBudget {
    /// Budget allowing `transport` transport retries and `timeout` timeout retries
    pub fn new(transport: u32, timeout: u32) -> Self {
        Self {
            transport,
            timeout,
            used: 0,
        }
    }

    /// Spend one retry on `error` if its class has budget left
    ///
    /// Returns the 1-based retry number to compute the backoff from, or
    /// `None` when the error must be surfaced.
    pub fn consume(&mut self, error: &Error) -> Option<u32> {
        let remaining = match error {
            Error::Transport(_) => &mut self.transport,
            Error::Timeout { .. } => &mut self.timeout,
            _ => return None,
        };
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        self.used += 1;
        Some(self.used)
    }

    /// Retries spent so far
    pub fn used(&self) -> u32 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout() -> Error {
        Error::Timeout {
            operation: "model call".into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_duration() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 2.0);

        assert_eq!(policy.backoff_duration(0), Duration::ZERO);
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_duration(10), Duration::from_secs(1));
    }

    #[test]
    fn test_immediate_policy() {
        let policy = RetryPolicy::immediate();
        assert_eq!(policy.backoff_duration(5), Duration::ZERO);
    }

    #[test]
    fn test_budgets_are_separate() {
        let mut budget = RetryBudget::new(2, 1);

        assert_eq!(budget.consume(&Error::Transport("reset".into())), Some(1));
        assert_eq!(budget.consume(&timeout()), Some(2));
        assert_eq!(budget.consume(&timeout()), None);
        assert_eq!(budget.consume(&Error::Transport("reset".into())), Some(3));
        assert_eq!(budget.consume(&Error::Transport("reset".into())), None);
        assert_eq!(budget.used(), 3);
    }

    #[test]
    fn test_fatal_errors_never_retried() {
        let mut budget = RetryBudget::new(5, 5);
        assert_eq!(budget.consume(&Error::Model("bad key".into())), None);
        assert_eq!(budget.consume(&Error::UnknownAgent("ghost".into())), None);
        assert_eq!(budget.used(), 0);
    }
}
