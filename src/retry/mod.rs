//! Retry policy: executor options, backoff calculation, and the retry
//! predicate.
//!
//! The executor in [`executor`] combines these with the circuit breaker in
//! [`breaker`]. Delay growth is exponential with additive jitter so
//! concurrent callers don't synchronize their retry storms.

pub mod breaker;
pub mod executor;

use std::time::Duration;

use rand::Rng;

use crate::classify::{Classification, Severity};

// Re-export the executor surface for convenient access
pub use breaker::{BreakerState, CircuitBreaker};
pub use executor::{boxed_operation, BoxedOperation, ManualRetryError, RetryError, RetryExecutor};

/// Upper bound of the additive jitter window, in milliseconds.
const JITTER_WINDOW_MS: u64 = 1000;

/// Configuration for a [`RetryExecutor`].
///
/// Each executor owns one circuit breaker, so operations that share an
/// executor share trip decisions. Build one instance per logical backend at
/// process start and pass it by reference; the presets below cover the
/// application's three backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryOptions {
    /// Maximum attempts for one logical call.
    /// Default: 3
    pub max_retries: u32,

    /// Base delay when the classification doesn't suggest one.
    /// Default: 1 second
    pub base_delay: Duration,

    /// Hard cap on any single backoff delay.
    /// Default: 30 seconds
    pub max_delay: Duration,

    /// Exponential growth factor between attempts.
    /// Default: 2
    pub backoff_multiplier: u32,

    /// Whether to add random jitter to each delay.
    /// Default: true
    pub jitter_enabled: bool,

    /// Qualifying failures before the breaker opens.
    /// Default: 5
    pub breaker_threshold: u32,

    /// How long an open breaker rejects calls before probing.
    /// Default: 60 seconds
    pub breaker_timeout: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
            backoff_multiplier: 2,
            jitter_enabled: true,
            breaker_threshold: 5,
            breaker_timeout: Duration::from_millis(60000),
        }
    }
}

impl RetryOptions {
    /// Creates options with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for the remote document store.
    pub fn store() -> Self {
        Self::default()
    }

    /// Preset for raw network calls: more patient, longer base delay.
    pub fn network() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(2000),
            ..Self::default()
        }
    }

    /// Preset for borrower-profile operations: fail fast, the UI handles it.
    pub fn profile() -> Self {
        Self {
            max_retries: 2,
            ..Self::default()
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the delay cap.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the exponential growth factor.
    pub fn with_backoff_multiplier(mut self, multiplier: u32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter_enabled = enabled;
        self
    }

    /// Sets the breaker failure threshold.
    pub fn with_breaker_threshold(mut self, threshold: u32) -> Self {
        self.breaker_threshold = threshold;
        self
    }

    /// Sets the breaker open timeout.
    pub fn with_breaker_timeout(mut self, timeout: Duration) -> Self {
        self.breaker_timeout = timeout;
        self
    }
}

/// Calculates the backoff delay for an attempt, in milliseconds.
///
/// `min(base * 2^(attempt - 1) + jitter, max)` where `jitter` is uniform in
/// `[0, 1000)` ms. The jitter is added rather than multiplied so small base
/// delays still spread out concurrent callers. Non-decreasing in `attempt`
/// before the cap (when jitter is disabled via [`backoff_delay_ms`]) and
/// never exceeds `max_delay_ms`.
pub fn calculate_retry_delay(base_delay_ms: u64, attempt: u32, max_delay_ms: u64) -> u64 {
    backoff_delay_ms(base_delay_ms, 2, attempt, max_delay_ms, true)
}

/// Backoff calculation with an explicit multiplier and jitter switch, used
/// by the executor with its configured options.
pub fn backoff_delay_ms(
    base_delay_ms: u64,
    multiplier: u32,
    attempt: u32,
    max_delay_ms: u64,
    jitter_enabled: bool,
) -> u64 {
    // 2^63 already dwarfs any sane cap; clamp the exponent to avoid overflow
    let exponent = attempt.saturating_sub(1).min(63);
    let factor = (multiplier.max(1) as u64).saturating_pow(exponent);
    let raw = base_delay_ms.saturating_mul(factor);

    let jitter = if jitter_enabled {
        rand::thread_rng().gen_range(0..JITTER_WINDOW_MS)
    } else {
        0
    };

    raw.saturating_add(jitter).min(max_delay_ms)
}

/// Whether another attempt is allowed for this classification.
///
/// Critical failures are never retried automatically even when their raw
/// `retryable` flag is set; the caller has to decide what to do with a
/// systemic outage.
pub fn should_retry(classification: &Classification, current_attempt: u32) -> bool {
    classification.retryable
        && current_attempt < classification.max_retries
        && classification.severity != Severity::Critical
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, ErrorContext, RawError};

    fn ctx(operation: &str) -> ErrorContext {
        ErrorContext::new(operation, "test")
    }

    #[test]
    fn test_options_defaults() {
        let options = RetryOptions::default();
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.base_delay, Duration::from_millis(1000));
        assert_eq!(options.max_delay, Duration::from_millis(30000));
        assert_eq!(options.backoff_multiplier, 2);
        assert!(options.jitter_enabled);
        assert_eq!(options.breaker_threshold, 5);
        assert_eq!(options.breaker_timeout, Duration::from_millis(60000));
    }

    #[test]
    fn test_options_builder() {
        let options = RetryOptions::new()
            .with_max_retries(7)
            .with_base_delay(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(3)
            .with_jitter(false)
            .with_breaker_threshold(2)
            .with_breaker_timeout(Duration::from_secs(10));

        assert_eq!(options.max_retries, 7);
        assert_eq!(options.base_delay, Duration::from_millis(250));
        assert_eq!(options.max_delay, Duration::from_secs(5));
        assert_eq!(options.backoff_multiplier, 3);
        assert!(!options.jitter_enabled);
        assert_eq!(options.breaker_threshold, 2);
        assert_eq!(options.breaker_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryOptions::store(), RetryOptions::default());
        assert_eq!(RetryOptions::network().max_retries, 5);
        assert_eq!(RetryOptions::network().base_delay, Duration::from_millis(2000));
        assert_eq!(RetryOptions::profile().max_retries, 2);
    }

    #[test]
    fn test_delay_exponential_growth_without_jitter() {
        // attempt n: 1000 * 2^(n-1)
        assert_eq!(backoff_delay_ms(1000, 2, 1, 60000, false), 1000);
        assert_eq!(backoff_delay_ms(1000, 2, 2, 60000, false), 2000);
        assert_eq!(backoff_delay_ms(1000, 2, 3, 60000, false), 4000);
        assert_eq!(backoff_delay_ms(1000, 2, 4, 60000, false), 8000);
        assert_eq!(backoff_delay_ms(1000, 2, 5, 60000, false), 16000);
    }

    #[test]
    fn test_delay_monotonic_before_cap() {
        let mut previous = 0;
        for attempt in 1..=10 {
            let delay = backoff_delay_ms(500, 2, attempt, u64::MAX, false);
            assert!(delay >= previous, "delay decreased at attempt {}", attempt);
            previous = delay;
        }
    }

    #[test]
    fn test_delay_respects_cap() {
        assert_eq!(backoff_delay_ms(10000, 2, 3, 30000, false), 30000);
        assert_eq!(backoff_delay_ms(10000, 2, 10, 30000, false), 30000);
    }

    #[test]
    fn test_delay_cap_applies_after_jitter() {
        for attempt in 1..=10 {
            let delay = calculate_retry_delay(10000, attempt, 30000);
            assert!(delay <= 30000, "cap exceeded at attempt {}", attempt);
        }
    }

    #[test]
    fn test_delay_jitter_within_window() {
        for _ in 0..50 {
            let delay = calculate_retry_delay(1000, 1, 60000);
            assert!(delay >= 1000);
            assert!(delay < 1000 + JITTER_WINDOW_MS);
        }
    }

    #[test]
    fn test_delay_handles_extreme_attempts() {
        let delay = backoff_delay_ms(1000, 2, u32::MAX, 30000, false);
        assert_eq!(delay, 30000);
    }

    #[test]
    fn test_delay_attempt_zero_treated_as_first() {
        assert_eq!(backoff_delay_ms(1000, 2, 0, 60000, false), 1000);
    }

    #[test]
    fn test_should_retry_within_budget() {
        let classification = classify(&RawError::new("network error"), &ctx("list_items"));
        assert_eq!(classification.max_retries, 5);
        assert!(should_retry(&classification, 1));
        assert!(should_retry(&classification, 4));
        assert!(!should_retry(&classification, 5));
        assert!(!should_retry(&classification, 6));
    }

    #[test]
    fn test_should_retry_refuses_non_retryable() {
        let classification = classify(&RawError::new("name is required"), &ctx("save_item"));
        assert!(!classification.retryable);
        assert!(!should_retry(&classification, 0));
    }

    #[test]
    fn test_should_retry_refuses_critical_even_when_flagged_retryable() {
        let classification = classify(
            &RawError::coded("resource-exhausted", "quota used up"),
            &ctx("write_doc"),
        );
        assert!(classification.retryable);
        assert_eq!(classification.severity, Severity::Critical);
        assert!(!should_retry(&classification, 1));
    }
}
