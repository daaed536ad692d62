//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Calculate the delay before retry number `attempt` (1-based).
///
/// The delay doubles from `base_ms` per attempt, is capped at `max_ms`, and
/// gets up to 10% jitter on top so concurrent handlers do not retry in lockstep.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Backoff for `attempt` using the configured bounds.
pub fn backoff_for(config: &RetryConfig, attempt: u32) -> Duration {
    calculate_backoff(attempt, config.base_delay_ms, config.max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 200, 2000);
        assert!(b1.as_millis() >= 200 && b1.as_millis() < 220);

        let b2 = calculate_backoff(2, 200, 2000);
        assert!(b2.as_millis() >= 400 && b2.as_millis() < 440);

        let max = calculate_backoff(10, 200, 1000);
        assert!(max.as_millis() >= 1000 && max.as_millis() < 1100);
    }

    #[test]
    fn zeroth_attempt_has_no_delay() {
        assert_eq!(calculate_backoff(0, 200, 2000), Duration::ZERO);
    }

    #[test]
    fn huge_attempts_do_not_overflow() {
        let d = calculate_backoff(u32::MAX, u64::MAX, 5000);
        assert!(d.as_millis() >= 5000);
    }
}
