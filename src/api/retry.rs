use reqwest::StatusCode;
use std::time::Duration;

/// Base delay before the first retry.
pub const BASE_DELAY_MS: u64 = 1000;

/// Only rate limiting is retried automatically.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
}

/// Exponential backoff: the delay doubles with each attempt (0-based).
pub fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(16);
    Duration::from_millis(BASE_DELAY_MS.saturating_mul(2u64.saturating_pow(exponent)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_each_attempt() {
        assert_eq!(retry_delay(0), Duration::from_millis(1000));
        assert_eq!(retry_delay(1), Duration::from_millis(2000));
        assert_eq!(retry_delay(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
    }
}
