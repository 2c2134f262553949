//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Attempts beyond this are clamped so the exponent cannot overflow.
const MAX_EXPONENT: u32 = 20;

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow((attempt - 1).min(MAX_EXPONENT));
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Backoff parameters for a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry in milliseconds.
    pub base_ms: u64,
    /// Upper bound for the delay in milliseconds (before jitter).
    pub max_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self { base_ms, max_ms }
    }

    /// Delay to wait after `attempt` consecutive idle or failed iterations.
    pub fn delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_ms, self.max_ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 50,
            max_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000);
        assert!(max.as_millis() < 1100);
    }

    #[test]
    fn zero_attempt_means_no_delay() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);
        assert_eq!(BackoffPolicy::default().delay(0), Duration::ZERO);
    }

    #[test]
    fn huge_attempt_counts_stay_capped() {
        let delay = calculate_backoff(u32::MAX, 50, 5_000);
        assert!(delay.as_millis() >= 5_000);
        assert!(delay.as_millis() < 5_500);
    }
}
