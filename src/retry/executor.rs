//! The resilient executor: retries an asynchronous operation under the
//! classifier's policy, guarded by a circuit breaker.
//!
//! Attempts for one logical call are strictly sequential: attempt N+1 never
//! starts before attempt N's failure is classified and the backoff elapses.
//! Multiple callers may share one executor; breaker counters are serialized
//! behind a mutex so concurrent failures accumulate without lost updates.
//! Logically distinct backends must use distinct executors so one outage
//! doesn't trip the other's breaker.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{backoff_delay_ms, should_retry, BreakerState, CircuitBreaker, RetryOptions};
use crate::classify::{
    Classification, Classifier, ErrorContext, ErrorKind, RawError, RuleClassifier, Severity,
};
use crate::stats::RetryMetrics;

/// A re-invocable asynchronous operation, stored for manual retry.
pub type BoxedOperation<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, RawError>> + Send + Sync>;

/// Wraps a closure into a [`BoxedOperation`] for the manual-retry path.
pub fn boxed_operation<T, F, Fut>(f: F) -> BoxedOperation<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RawError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()) as BoxFuture<'static, Result<T, RawError>>)
}

/// Terminal failure returned to the caller.
///
/// Every ultimately-non-retryable or exhausted failure arrives as this one
/// shape; callers branch on `classification.retryable` and `exhausted`
/// rather than on the root cause.
#[derive(Clone, Debug, Error)]
#[error("{classification} after {attempts_made}/{max_retries} attempts")]
pub struct RetryError {
    /// The classification of the final failure.
    pub classification: Classification,
    /// Attempts actually made before giving up. Zero when the breaker
    /// rejected the call outright.
    pub attempts_made: u32,
    /// The attempt budget for this call.
    pub max_retries: u32,
    /// Whether the budget was used up (as opposed to a non-retryable
    /// failure surfacing early).
    pub exhausted: bool,
}

impl RetryError {
    /// True when the circuit breaker rejected the call without attempting it.
    pub fn is_circuit_open(&self) -> bool {
        self.classification.kind == ErrorKind::CircuitOpen
    }

    /// True when the caller cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        self.classification.kind == ErrorKind::Cancelled
    }
}

/// Failure of a manual-retry call, carrying the captured operation so the
/// caller can explicitly retry later.
///
/// This path exists for UI-initiated retries: a human approves each attempt
/// instead of the executor backing off automatically.
pub struct ManualRetryError<T> {
    /// The terminal failure from the single attempt.
    pub error: RetryError,
    /// Whether offering a retry button makes sense for this failure.
    pub manual_retry_available: bool,
    operation: BoxedOperation<T>,
    context: ErrorContext,
}

impl<T> ManualRetryError<T> {
    /// The classification of the failure.
    pub fn classification(&self) -> &Classification {
        &self.error.classification
    }

    /// Discards the captured operation, keeping only the failure.
    pub fn into_error(self) -> RetryError {
        self.error
    }
}

impl<T> fmt::Debug for ManualRetryError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualRetryError")
            .field("error", &self.error)
            .field("manual_retry_available", &self.manual_retry_available)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for ManualRetryError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<T> std::error::Error for ManualRetryError<T> {}

/// Executes operations with automatic classification-driven retries behind
/// a circuit breaker.
///
/// One executor per logical backend: the named constructors cover the
/// application's three. Build them once at process start and inject them;
/// tests construct isolated instances with fresh breaker state.
pub struct RetryExecutor {
    options: RetryOptions,
    breaker: Mutex<CircuitBreaker>,
    classifier: RuleClassifier,
    metrics: Option<Arc<RetryMetrics>>,
}

impl RetryExecutor {
    /// Creates an executor with the given options and a fresh breaker.
    pub fn new(options: RetryOptions) -> Self {
        let breaker = CircuitBreaker::new(options.breaker_threshold, options.breaker_timeout);
        Self {
            options,
            breaker: Mutex::new(breaker),
            classifier: RuleClassifier::new(),
            metrics: None,
        }
    }

    /// Executor for the remote document store.
    pub fn store() -> Self {
        Self::new(RetryOptions::store())
    }

    /// Executor for raw network calls.
    pub fn network() -> Self {
        Self::new(RetryOptions::network())
    }

    /// Executor for borrower-profile operations.
    pub fn profile() -> Self {
        Self::new(RetryOptions::profile())
    }

    /// Attaches a shared metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<RetryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the configured options.
    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Returns the breaker's current state.
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.lock().unwrap().state()
    }

    /// Returns the breaker's current qualifying-failure count.
    pub fn breaker_failure_count(&self) -> u32 {
        self.breaker.lock().unwrap().failure_count()
    }

    /// Runs an operation with automatic retries.
    ///
    /// On failure the error is classified and, while the classification's
    /// policy and the attempt budget allow, retried after an exponential
    /// backoff. Non-retryable failures, an exhausted budget, or an open
    /// circuit surface as a single [`RetryError`].
    pub async fn run_with_auto_retry<T, F, Fut>(
        &self,
        operation: F,
        context: &ErrorContext,
    ) -> Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RawError>>,
    {
        self.run_inner(operation, context, None, self.options.max_retries)
            .await
    }

    /// Like [`run_with_auto_retry`](Self::run_with_auto_retry), but aborts
    /// as soon as `cancel` flips to `true`.
    ///
    /// A caller-initiated cancellation is not a failure: it does not touch
    /// the breaker and surfaces with a non-retryable `cancelled`
    /// classification.
    pub async fn run_with_auto_retry_with_cancel<T, F, Fut>(
        &self,
        operation: F,
        context: &ErrorContext,
        cancel: watch::Receiver<bool>,
    ) -> Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RawError>>,
    {
        self.run_inner(operation, context, Some(cancel), self.options.max_retries)
            .await
    }

    /// Runs an operation exactly once; on failure, returns the captured
    /// operation alongside the classified error so the caller can invoke
    /// [`retry`](Self::retry) explicitly later.
    pub async fn run_with_manual_retry<T>(
        &self,
        operation: BoxedOperation<T>,
        context: &ErrorContext,
    ) -> Result<T, ManualRetryError<T>> {
        let op = Arc::clone(&operation);
        match self.run_inner(move || (op)(), context, None, 1).await {
            Ok(value) => Ok(value),
            Err(error) => {
                let manual_retry_available = error.classification.retryable;
                Err(ManualRetryError {
                    error,
                    manual_retry_available,
                    operation,
                    context: context.clone(),
                })
            }
        }
    }

    /// Re-invokes the operation captured by a failed manual-retry call,
    /// once, through the auto-retry path.
    pub async fn retry<T>(&self, manual: ManualRetryError<T>) -> Result<T, RetryError> {
        let ManualRetryError {
            operation, context, ..
        } = manual;
        let op = Arc::clone(&operation);
        self.run_inner(move || (op)(), &context, None, 1).await
    }

    async fn run_inner<T, F, Fut>(
        &self,
        operation: F,
        context: &ErrorContext,
        mut cancel: Option<watch::Receiver<bool>>,
        max_retries: u32,
    ) -> Result<T, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RawError>>,
    {
        {
            let mut breaker = self.breaker.lock().unwrap();
            if !breaker.allow_call() {
                drop(breaker);
                warn!(operation = %context.operation, "rejected by open circuit breaker");
                if let Some(metrics) = &self.metrics {
                    metrics.record_circuit_rejection();
                }
                return Err(RetryError {
                    classification: self.synthetic(
                        ErrorKind::CircuitOpen,
                        Severity::High,
                        context,
                        "circuit breaker is open",
                    ),
                    attempts_made: 0,
                    max_retries,
                    exhausted: false,
                });
            }
        }

        let max_attempts = max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;

            if is_cancelled(&cancel) {
                return Err(self.cancelled_error(context, attempt - 1, max_attempts));
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_attempt();
            }

            let raw = match operation().await {
                Ok(value) => {
                    self.breaker.lock().unwrap().record_success();
                    if let Some(metrics) = &self.metrics {
                        metrics.record_success();
                    }
                    return Ok(value);
                }
                Err(raw) => raw,
            };

            let classification = self.classifier.classify(&raw, context);
            if let Some(metrics) = &self.metrics {
                metrics.record_failure(classification.category);
            }
            self.breaker
                .lock()
                .unwrap()
                .record_failure(classification.severity);

            let will_retry = attempt < max_attempts && should_retry(&classification, attempt);
            if !will_retry {
                warn!(
                    kind = classification.kind.as_str(),
                    operation = %context.operation,
                    attempts = attempt,
                    "operation failed terminally"
                );
                return Err(RetryError {
                    classification,
                    attempts_made: attempt,
                    max_retries: max_attempts,
                    exhausted: attempt >= max_attempts,
                });
            }

            let base_ms = if classification.retry_delay_ms > 0 {
                classification.retry_delay_ms
            } else {
                self.options.base_delay.as_millis() as u64
            };
            let delay_ms = backoff_delay_ms(
                base_ms,
                self.options.backoff_multiplier,
                attempt,
                self.options.max_delay.as_millis() as u64,
                self.options.jitter_enabled,
            );
            debug!(
                kind = classification.kind.as_str(),
                operation = %context.operation,
                attempt,
                delay_ms,
                "retrying after backoff"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_retry();
            }

            if !sleep_unless_cancelled(Duration::from_millis(delay_ms), &mut cancel).await {
                return Err(self.cancelled_error(context, attempt, max_attempts));
            }
        }
    }

    fn synthetic(
        &self,
        kind: ErrorKind,
        severity: Severity,
        context: &ErrorContext,
        message: &str,
    ) -> Classification {
        Classification {
            kind,
            severity,
            category: kind.category(),
            retryable: false,
            retry_delay_ms: 0,
            max_retries: 0,
            original: RawError::new(message),
            context: context.clone(),
            timestamp: Utc::now(),
        }
    }

    fn cancelled_error(
        &self,
        context: &ErrorContext,
        attempts_made: u32,
        max_retries: u32,
    ) -> RetryError {
        debug!(operation = %context.operation, "operation cancelled by caller");
        RetryError {
            classification: self.synthetic(
                ErrorKind::Cancelled,
                Severity::Low,
                context,
                "operation cancelled by caller",
            ),
            attempts_made,
            max_retries,
            exhausted: false,
        }
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
}

/// Sleeps for `delay`, waking early if the cancel flag flips to `true`.
/// Returns `false` when cancelled.
async fn sleep_unless_cancelled(
    delay: Duration,
    cancel: &mut Option<watch::Receiver<bool>>,
) -> bool {
    let Some(rx) = cancel else {
        tokio::time::sleep(delay).await;
        return true;
    };

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = rx.changed() => match changed {
                Ok(()) if *rx.borrow() => return false,
                Ok(()) => continue,
                // Sender dropped: no cancellation can arrive anymore
                Err(_) => {
                    sleep.as_mut().await;
                    return true;
                }
            },
        }
    }
}
