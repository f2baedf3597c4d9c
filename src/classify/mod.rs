//! Failure classification types.
//!
//! This module provides the value types produced by the classifier: the
//! failure taxonomy ([`ErrorKind`]), severity ordering ([`Severity`]), coarse
//! grouping ([`ErrorCategory`]), and the immutable [`Classification`] verdict
//! that drives both user messaging and retry policy.

pub mod messages;
pub mod rules;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Re-export the classifier entry points for convenient access
pub use messages::{ErrorMessage, MessageBundle};
pub use rules::{classify, Classifier, RuleClassifier};

/// Severity of a classified failure, ordered from least to most severe.
///
/// The ordering is load-bearing: the circuit breaker only counts failures at
/// `High` or above, and `Critical` failures are never retried automatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected noise: validation problems, user-correctable input.
    Low,
    /// Unclassified or recoverable failures.
    Medium,
    /// Failures that indicate a degraded dependency.
    High,
    /// Systemic failures. Never retried automatically.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Coarse grouping of failure kinds, used for metrics and filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Connectivity, DNS, timeouts, offline.
    Network,
    /// Sign-in, credentials, permissions.
    Authentication,
    /// The remote document store.
    Store,
    /// Input validation. Never retryable.
    Validation,
    /// Domain entities (borrower profiles, equipment records).
    Domain,
    /// Everything else.
    General,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Store => "store",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Domain => "domain",
            ErrorCategory::General => "general",
        };
        write!(f, "{}", s)
    }
}

/// The failure taxonomy.
///
/// Each member carries a fixed retry policy assigned by the classifier and a
/// display bundle in [`messages`]. The `match` in [`messages::bundle`] is
/// exhaustive, so adding a member without a bundle fails to compile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Generic connectivity failure.
    Network,
    /// A request exceeded its time budget.
    NetworkTimeout,
    /// The host reported no connectivity at all.
    NetworkOffline,
    /// Interactive sign-in was interrupted (popup blocked, closed, cancelled).
    AuthRequired,
    /// Credentials expired; the caller must re-authenticate.
    AuthExpired,
    /// Explicit access denial.
    PermissionDenied,
    /// Unspecific auth-branch failure.
    Permission,
    /// Generic validation failure.
    Validation,
    /// A required field was missing or empty.
    ValidationRequired,
    /// A field did not match its expected format.
    ValidationFormat,
    /// A value collided with an existing record.
    ValidationDuplicate,
    /// Unspecific store-branch failure.
    Store,
    /// The remote store is temporarily unavailable.
    StoreUnavailable,
    /// Store quota or resources exhausted.
    StoreQuotaExceeded,
    /// A store rule or precondition rejected the operation.
    StoreRulesDenied,
    /// A domain entity could not be found.
    DomainNotFound,
    /// A domain entity is missing required data.
    DomainIncomplete,
    /// A domain entity already exists.
    DomainDuplicate,
    /// Unspecific domain-branch failure.
    Domain,
    /// The circuit breaker rejected the call without attempting it.
    CircuitOpen,
    /// The caller cancelled the operation. Never a failure signal.
    Cancelled,
    /// Nothing matched.
    Unknown,
    /// Internal invariant violation.
    System,
}

impl ErrorKind {
    /// Returns the coarse category this kind belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::Network | ErrorKind::NetworkTimeout | ErrorKind::NetworkOffline => {
                ErrorCategory::Network
            }
            ErrorKind::AuthRequired
            | ErrorKind::AuthExpired
            | ErrorKind::PermissionDenied
            | ErrorKind::Permission => ErrorCategory::Authentication,
            ErrorKind::Store
            | ErrorKind::StoreUnavailable
            | ErrorKind::StoreQuotaExceeded
            | ErrorKind::StoreRulesDenied => ErrorCategory::Store,
            ErrorKind::Validation
            | ErrorKind::ValidationRequired
            | ErrorKind::ValidationFormat
            | ErrorKind::ValidationDuplicate => ErrorCategory::Validation,
            ErrorKind::DomainNotFound
            | ErrorKind::DomainIncomplete
            | ErrorKind::DomainDuplicate
            | ErrorKind::Domain => ErrorCategory::Domain,
            ErrorKind::CircuitOpen
            | ErrorKind::Cancelled
            | ErrorKind::Unknown
            | ErrorKind::System => ErrorCategory::General,
        }
    }

    /// Returns the snake_case name used in logs and serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::NetworkTimeout => "network_timeout",
            ErrorKind::NetworkOffline => "network_offline",
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::AuthExpired => "auth_expired",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Permission => "permission",
            ErrorKind::Validation => "validation",
            ErrorKind::ValidationRequired => "validation_required",
            ErrorKind::ValidationFormat => "validation_format",
            ErrorKind::ValidationDuplicate => "validation_duplicate",
            ErrorKind::Store => "store",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::StoreQuotaExceeded => "store_quota_exceeded",
            ErrorKind::StoreRulesDenied => "store_rules_denied",
            ErrorKind::DomainNotFound => "domain_not_found",
            ErrorKind::DomainIncomplete => "domain_incomplete",
            ErrorKind::DomainDuplicate => "domain_duplicate",
            ErrorKind::Domain => "domain",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
            ErrorKind::System => "system",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw failure from a remote operation, before classification.
///
/// Remote failures arrive with an optional machine-readable code (for
/// example `auth/popup-blocked` or `resource-exhausted`) and a human-readable
/// message. The classifier inspects both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawError {
    /// Machine-readable error code, when the failing layer provides one.
    pub code: Option<String>,
    /// Human-readable failure message.
    pub message: String,
}

impl RawError {
    /// Creates a raw error from a message alone.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates a raw error carrying a machine-readable code.
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Returns the code, or an empty string when absent.
    pub fn code_str(&self) -> &str {
        self.code.as_deref().unwrap_or("")
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RawError {}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::new(message)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::new(message)
    }
}

impl From<std::io::Error> for RawError {
    fn from(err: std::io::Error) -> Self {
        RawError::new(err.to_string())
    }
}

/// Context describing the operation that produced a failure.
///
/// The classifier keys some branches off the operation name (validation
/// steps, domain-entity operations) and the offline hint; everything else in
/// `extra` rides along for logging only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Name of the failing operation, e.g. `load_profile` or `reserve_item`.
    pub operation: String,
    /// Component the operation belongs to, e.g. `inventory` or `checkout`.
    pub component: String,
    /// Additional key-value metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl ErrorContext {
    /// Creates a context for the given operation and component.
    pub fn new(operation: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            component: component.into(),
            extra: HashMap::new(),
        }
    }

    /// Adds a metadata key-value pair.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Marks the host as offline. The classifier maps any failure under an
    /// offline host to `network_offline`.
    pub fn offline(mut self) -> Self {
        self.extra.insert("offline".to_string(), "true".to_string());
        self
    }

    /// True when the host reported no connectivity.
    pub fn is_offline(&self) -> bool {
        self.extra.get("offline").map(String::as_str) == Some("true")
    }
}

/// The immutable verdict produced for a failure.
///
/// Drives both user messaging ([`Classification::user_message`]) and retry
/// policy (`retry::should_retry`). Apart from `timestamp`, a classification
/// is a pure function of the error signature and `context.operation`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Classification {
    /// The taxonomy member assigned to the failure.
    pub kind: ErrorKind,
    /// Severity of the failure.
    pub severity: Severity,
    /// Coarse category, derived from `kind`.
    pub category: ErrorCategory,
    /// Raw policy flag. Effective retryability additionally requires
    /// `severity != Critical`; use `retry::should_retry`.
    pub retryable: bool,
    /// Suggested base delay before the next attempt, in milliseconds.
    pub retry_delay_ms: u64,
    /// Policy ceiling on retries for this kind of failure.
    pub max_retries: u32,
    /// The raw failure, kept for logging only.
    pub original: RawError,
    /// The operation context, kept for logging only.
    pub context: ErrorContext,
    /// When the classification was made.
    pub timestamp: DateTime<Utc>,
}

impl Classification {
    /// Returns the display bundle for this classification, with severity,
    /// retryability, and timestamp passed through.
    pub fn user_message(&self) -> ErrorMessage {
        messages::error_message(self)
    }

    /// True when this failure counts toward the circuit breaker.
    pub fn trips_breaker(&self) -> bool {
        self.severity >= Severity::High
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.kind, self.severity, self.original.message
        )
    }
}
