//! Circuit breaker guarding a single backend.
//!
//! Three states: `Closed` (normal), `Open` (fail fast), `HalfOpen` (one
//! probe allowed). Only high and critical severity failures count toward the
//! trip threshold; validation noise and other expected failures never open
//! the breaker. State lives in process memory only and resets on restart.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::classify::Severity;

/// State of a circuit breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BreakerState {
    /// Normal operation, calls pass through.
    #[default]
    Closed,
    /// Threshold exceeded, calls are rejected until the timeout elapses.
    Open,
    /// Timeout elapsed, a single probe call is allowed.
    HalfOpen,
}

/// A three-state circuit breaker owned by one executor.
///
/// The executor serializes access behind a mutex; this type itself is a
/// plain state machine with no interior locking.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    /// Creates a closed breaker with the given trip threshold and open
    /// timeout.
    pub fn new(threshold: u32, open_timeout: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            threshold,
            open_timeout,
        }
    }

    /// Returns the current state without side effects.
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Returns the current qualifying-failure count.
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Decides whether a call may proceed.
    ///
    /// Returns `false` while the breaker is open and inside its timeout
    /// window. Once the window elapses the breaker moves to `HalfOpen` and
    /// the call proceeds as the probe.
    pub fn allow_call(&mut self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self
                    .last_failure_time
                    .map(|t| t.elapsed())
                    .unwrap_or(self.open_timeout);
                if elapsed >= self.open_timeout {
                    debug!("circuit breaker half-open, allowing probe");
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call: closes the breaker and resets the count.
    pub fn record_success(&mut self) {
        if self.state != BreakerState::Closed {
            debug!("circuit breaker closed after successful call");
        }
        self.state = BreakerState::Closed;
        self.failure_count = 0;
    }

    /// Records a failed call.
    ///
    /// Low and medium severity failures are expected noise and are ignored.
    /// High and critical failures increment the count; reaching the
    /// threshold opens the breaker.
    pub fn record_failure(&mut self, severity: Severity) {
        if severity < Severity::High {
            return;
        }
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());
        if self.failure_count >= self.threshold && self.state != BreakerState::Open {
            warn!(
                failure_count = self.failure_count,
                threshold = self.threshold,
                "circuit breaker opened"
            );
            self.state = BreakerState::Open;
        }
    }
}
