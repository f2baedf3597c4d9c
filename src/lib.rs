//! lendguard - failure classification and resilient execution for the
//! EquipLend equipment loan platform.
//!
//! The crate has two composable halves: a stateless [`classify`] module
//! that turns arbitrary remote failures into structured
//! [`Classification`](classify::Classification) verdicts, and a [`retry`]
//! module whose [`RetryExecutor`](retry::RetryExecutor) drives
//! classification-aware retries behind a per-backend circuit breaker.
//!
//! ```no_run
//! use lendguard::classify::{ErrorContext, RawError};
//! use lendguard::retry::RetryExecutor;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = RetryExecutor::store();
//! let context = ErrorContext::new("load_item", "inventory");
//!
//! let _item = executor
//!     .run_with_auto_retry(|| fetch_item("EQ-1042"), &context)
//!     .await?;
//! # Ok(())
//! # }
//! # async fn fetch_item(_id: &str) -> Result<String, RawError> { Ok(String::new()) }
//! ```

pub mod classify;
pub mod logging;
pub mod retry;
pub mod settings;
pub mod stats;

// Re-export the main types for convenient access
pub use classify::{
    classify, Classification, Classifier, ErrorCategory, ErrorContext, ErrorKind, ErrorMessage,
    RawError, RuleClassifier, Severity,
};
pub use retry::{
    calculate_retry_delay, should_retry, BreakerState, CircuitBreaker, ManualRetryError,
    RetryError, RetryExecutor, RetryOptions,
};
pub use settings::ResilienceSettings;
pub use stats::{MetricsSnapshot, RetryMetrics};
