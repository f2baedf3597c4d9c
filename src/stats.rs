//! Execution metrics for resilient calls.
//!
//! A small thread-safe collector that executors feed as they run: attempts,
//! outcomes, failure frequency by category, and circuit-breaker rejections.
//! Optional; executors work without one.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

use crate::classify::ErrorCategory;

#[derive(Debug, Default, Clone)]
struct Counters {
    attempts: u64,
    successes: u64,
    failures: u64,
    retries: u64,
    circuit_rejections: u64,
    failures_by_category: HashMap<ErrorCategory, u64>,
}

/// Thread-safe metrics collector shared across executors.
#[derive(Debug, Default)]
pub struct RetryMetrics {
    inner: RwLock<Counters>,
}

impl RetryMetrics {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one operation invocation.
    pub fn record_attempt(&self) {
        self.inner.write().unwrap().attempts += 1;
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        self.inner.write().unwrap().successes += 1;
    }

    /// Records a failed attempt in the given category.
    pub fn record_failure(&self, category: ErrorCategory) {
        let mut inner = self.inner.write().unwrap();
        inner.failures += 1;
        *inner.failures_by_category.entry(category).or_insert(0) += 1;
    }

    /// Records a retry that is about to be performed.
    pub fn record_retry(&self) {
        self.inner.write().unwrap().retries += 1;
    }

    /// Records a call rejected by an open circuit breaker.
    pub fn record_circuit_rejection(&self) {
        self.inner.write().unwrap().circuit_rejections += 1;
    }

    /// Returns an owned snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().unwrap();
        MetricsSnapshot {
            attempts: inner.attempts,
            successes: inner.successes,
            failures: inner.failures,
            retries: inner.retries,
            circuit_rejections: inner.circuit_rejections,
            failures_by_category: inner.failures_by_category.clone(),
        }
    }
}

/// Point-in-time view of the collector.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Operation invocations, including retries.
    pub attempts: u64,
    /// Calls that eventually succeeded.
    pub successes: u64,
    /// Failed attempts, including ones that were later retried.
    pub failures: u64,
    /// Retries performed.
    pub retries: u64,
    /// Calls rejected by an open breaker without an attempt.
    pub circuit_rejections: u64,
    /// Failed attempts grouped by category.
    pub failures_by_category: HashMap<ErrorCategory, u64>,
}

impl MetricsSnapshot {
    /// Fraction of attempts that succeeded, in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f64 / self.attempts as f64
    }

    /// The category failing most often, if any failures were recorded.
    pub fn most_common_failure(&self) -> Option<ErrorCategory> {
        self.failures_by_category
            .iter()
            .max_by_key(|(_, count)| *count)
            .map(|(category, _)| *category)
    }
}
