//! The rule-based failure classifier.
//!
//! Classification is an ordered list of detection branches over the raw
//! failure's code and message plus the operation context. First match wins;
//! the order matters because the signals overlap. An authentication failure
//! caused by a dropped connection, for example, is reclassified back to
//! `network` inside the auth branch so the caller gets network retry delays.
//!
//! All matching is substring/regex sniffing of error text. That heuristic is
//! deliberately confined to this module behind the [`Classifier`] trait, so
//! it can be swapped for structured error codes without touching callers.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use tracing::trace;

use super::{Classification, ErrorContext, ErrorKind, RawError, Severity};

/// Auth codes raised when interactive sign-in is interrupted by the user or
/// the browser. Transient: the user can simply try again.
const AUTH_INTERACTIVE_CODES: &[&str] = &[
    "auth/popup-blocked",
    "auth/popup-closed-by-user",
    "auth/cancelled-popup-request",
    "auth/user-cancelled",
];

/// Auth codes that mean the session is stale and a new sign-in is needed.
const AUTH_EXPIRED_CODES: &[&str] = &[
    "auth/user-token-expired",
    "auth/id-token-expired",
    "auth/requires-recent-login",
];

/// Store codes that route into the remote-store branch.
const STORE_CODES: &[&str] = &[
    "unavailable",
    "resource-exhausted",
    "quota-exceeded",
    "failed-precondition",
    "aborted",
    "data-loss",
];

/// Assigns a [`Classification`] to a raw failure.
///
/// Implementations must be total: every input yields a verdict, and the same
/// error signature with the same `context.operation` always yields the same
/// kind and category.
pub trait Classifier: Send + Sync {
    /// Classifies a failure. Never fails.
    fn classify(&self, error: &RawError, context: &ErrorContext) -> Classification;
}

/// Retry policy attached to a taxonomy match.
#[derive(Clone, Copy, Debug)]
struct Verdict {
    kind: ErrorKind,
    severity: Severity,
    retryable: bool,
    retry_delay_ms: u64,
    max_retries: u32,
}

impl Verdict {
    const fn new(
        kind: ErrorKind,
        severity: Severity,
        retryable: bool,
        retry_delay_ms: u64,
        max_retries: u32,
    ) -> Self {
        Self {
            kind,
            severity,
            retryable,
            retry_delay_ms,
            max_retries,
        }
    }
}

/// The default [`Classifier`]: ordered detection branches with compiled
/// regex vocabulary.
///
/// Branch order: network, authentication, remote store, validation, domain
/// entity, system, fallback. Stateless after construction.
#[derive(Debug)]
pub struct RuleClassifier {
    offline: Regex,
    timeout: Regex,
    connectivity: Regex,
    auth_vocab: Regex,
    auth_expired: Regex,
    access_denied: Regex,
    store_vocab: Regex,
    store_unavailable: Regex,
    store_quota: Regex,
    store_rules: Regex,
    validation_vocab: Regex,
    validation_required: Regex,
    validation_format: Regex,
    duplicate: Regex,
    domain_vocab: Regex,
    domain_not_found: Regex,
    domain_incomplete: Regex,
    system_vocab: Regex,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleClassifier {
    /// Compiles the detection vocabulary.
    ///
    /// # Panics
    /// Panics if a built-in pattern is invalid, which would be a bug in this
    /// crate rather than a runtime condition.
    pub fn new() -> Self {
        let compile = |pattern: &str| Regex::new(pattern).expect("invalid built-in pattern");
        Self {
            offline: compile(r"(?i)\b(offline|no\s+internet)\b"),
            timeout: compile(r"(?i)(timed?\s*out|\btimeout\b|deadline\s+(exceeded|expired))"),
            connectivity: compile(
                r"(?i)(network\s+(error|failure|request)|connection\s+(refused|reset|failed|closed|dropped)|fetch\s+failed|failed\s+to\s+fetch|\bdns\b|socket|unreachable)",
            ),
            auth_vocab: compile(
                r"(?i)(unauthorized|unauthenticated|not\s+signed\s+in|sign[-\s]?in\s+required|invalid\s+credential|permission|access\s+denied|forbidden)",
            ),
            auth_expired: compile(r"(?i)((token|session|credential)s?\s+(has\s+)?expired|re-?authenticate)"),
            access_denied: compile(
                r"(?i)(permission\s+denied|access\s+denied|insufficient\s+(permission|privilege)|forbidden)",
            ),
            store_vocab: compile(r"(?i)\b(firestore|database|document\s+store|storage|quota)\b"),
            store_unavailable: compile(r"(?i)unavailable"),
            store_quota: compile(r"(?i)(quota|resources?\s+exhausted|out\s+of\s+resources)"),
            store_rules: compile(r"(?i)(precondition|security\s+rules|rules?\s+denied)"),
            validation_vocab: compile(r"(?i)\b(required|invalid|format|must\s+be|cannot\s+be\s+empty)\b"),
            validation_required: compile(
                r"(?i)(is\s+required|required\s+field|missing|cannot\s+be\s+empty|is\s+empty)",
            ),
            validation_format: compile(r"(?i)(format|invalid|malformed|pattern|must\s+be)"),
            duplicate: compile(r"(?i)(duplicate|already\s+(exists|in\s+use|taken|registered))"),
            domain_vocab: compile(r"(?i)\b(profile|borrower)\b"),
            domain_not_found: compile(r"(?i)(not\s+found|does\s+not\s+exist|no\s+such)"),
            domain_incomplete: compile(r"(?i)incomplete"),
            system_vocab: compile(r"(?i)(internal\s+error|assertion\s+failed|panicked|invariant)"),
        }
    }

    fn finish(&self, verdict: Verdict, error: &RawError, context: &ErrorContext) -> Classification {
        trace!(
            kind = verdict.kind.as_str(),
            operation = %context.operation,
            "classified failure"
        );
        Classification {
            kind: verdict.kind,
            severity: verdict.severity,
            category: verdict.kind.category(),
            retryable: verdict.retryable,
            retry_delay_ms: verdict.retry_delay_ms,
            max_retries: verdict.max_retries,
            original: error.clone(),
            context: context.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Network detection. Runs first: connectivity failures leak into every
    /// other branch's vocabulary, and retry delays depend on catching them
    /// here.
    fn try_network(&self, error: &RawError, context: &ErrorContext) -> Option<Verdict> {
        let code = error.code_str();
        let message = &error.message;

        if context.is_offline() || self.offline.is_match(message) {
            return Some(Verdict::new(
                ErrorKind::NetworkOffline,
                Severity::Critical,
                true,
                5000,
                5,
            ));
        }
        if code == "timeout" || code == "deadline-exceeded" || self.timeout.is_match(message) {
            return Some(Verdict::new(
                ErrorKind::NetworkTimeout,
                Severity::High,
                true,
                3000,
                5,
            ));
        }
        if code.contains("network") || self.connectivity.is_match(message) {
            return Some(Verdict::new(ErrorKind::Network, Severity::High, true, 2000, 5));
        }
        None
    }

    /// Authentication and permission detection.
    fn try_auth(&self, error: &RawError, _context: &ErrorContext) -> Option<Verdict> {
        let code = error.code_str();
        let message = &error.message;

        let triggered = code.starts_with("auth/")
            || code == "unauthenticated"
            || code == "permission-denied"
            || self.auth_vocab.is_match(message)
            || self.auth_expired.is_match(message);
        if !triggered {
            return None;
        }

        if AUTH_INTERACTIVE_CODES.contains(&code) {
            return Some(Verdict::new(
                ErrorKind::AuthRequired,
                Severity::Medium,
                true,
                1000,
                2,
            ));
        }
        // A network failure surfaced through the sign-in path is still a
        // network failure; keep the network retry delays.
        if code == "auth/network-request-failed" {
            return Some(Verdict::new(ErrorKind::Network, Severity::High, true, 2000, 5));
        }
        if AUTH_EXPIRED_CODES.contains(&code) || self.auth_expired.is_match(message) {
            return Some(Verdict::new(
                ErrorKind::AuthExpired,
                Severity::High,
                false,
                0,
                0,
            ));
        }
        if code == "permission-denied" || self.access_denied.is_match(message) {
            return Some(Verdict::new(
                ErrorKind::PermissionDenied,
                Severity::High,
                true,
                1000,
                1,
            ));
        }
        Some(Verdict::new(
            ErrorKind::Permission,
            Severity::Medium,
            true,
            1000,
            2,
        ))
    }

    /// Remote document store detection.
    fn try_store(&self, error: &RawError, _context: &ErrorContext) -> Option<Verdict> {
        let code = error.code_str();
        let message = &error.message;

        let triggered = STORE_CODES.contains(&code) || self.store_vocab.is_match(message);
        if !triggered {
            return None;
        }

        if code == "unavailable" || self.store_unavailable.is_match(message) {
            return Some(Verdict::new(
                ErrorKind::StoreUnavailable,
                Severity::High,
                true,
                3000,
                5,
            ));
        }
        if code == "resource-exhausted"
            || code == "quota-exceeded"
            || self.store_quota.is_match(message)
        {
            return Some(Verdict::new(
                ErrorKind::StoreQuotaExceeded,
                Severity::Critical,
                true,
                10000,
                2,
            ));
        }
        if code == "failed-precondition" || self.store_rules.is_match(message) {
            return Some(Verdict::new(
                ErrorKind::StoreRulesDenied,
                Severity::High,
                true,
                1000,
                1,
            ));
        }
        Some(Verdict::new(ErrorKind::Store, Severity::Medium, true, 2000, 3))
    }

    /// Validation detection. Validation failures are user-correctable and
    /// never retried.
    fn try_validation(&self, error: &RawError, context: &ErrorContext) -> Option<Verdict> {
        let message = &error.message;

        let triggered = context.operation.to_ascii_lowercase().contains("valid")
            || context.component == "validation"
            || self.validation_vocab.is_match(message);
        if !triggered {
            return None;
        }

        let kind = if self.validation_required.is_match(message) {
            ErrorKind::ValidationRequired
        } else if self.validation_format.is_match(message) {
            ErrorKind::ValidationFormat
        } else if self.duplicate.is_match(message) {
            ErrorKind::ValidationDuplicate
        } else {
            ErrorKind::Validation
        };
        Some(Verdict::new(kind, Severity::Low, false, 0, 0))
    }

    /// Domain-entity detection for borrower profiles.
    fn try_domain(&self, error: &RawError, context: &ErrorContext) -> Option<Verdict> {
        let message = &error.message;

        let operation = context.operation.to_ascii_lowercase();
        let triggered = operation.contains("profile")
            || operation.contains("borrower")
            || self.domain_vocab.is_match(message);
        if !triggered {
            return None;
        }

        if self.domain_not_found.is_match(message) {
            return Some(Verdict::new(
                ErrorKind::DomainNotFound,
                Severity::Medium,
                false,
                0,
                0,
            ));
        }
        if self.domain_incomplete.is_match(message) {
            return Some(Verdict::new(
                ErrorKind::DomainIncomplete,
                Severity::Medium,
                false,
                0,
                0,
            ));
        }
        if self.duplicate.is_match(message) {
            return Some(Verdict::new(
                ErrorKind::DomainDuplicate,
                Severity::Medium,
                false,
                0,
                0,
            ));
        }
        Some(Verdict::new(ErrorKind::Domain, Severity::Medium, true, 1000, 2))
    }

    /// Internal invariant violations. Not recoverable by retrying.
    fn try_system(&self, error: &RawError, _context: &ErrorContext) -> Option<Verdict> {
        let code = error.code_str();
        if code == "internal" || self.system_vocab.is_match(&error.message) {
            return Some(Verdict::new(
                ErrorKind::System,
                Severity::Critical,
                false,
                0,
                0,
            ));
        }
        None
    }
}

impl Classifier for RuleClassifier {
    fn classify(&self, error: &RawError, context: &ErrorContext) -> Classification {
        let verdict = self
            .try_network(error, context)
            .or_else(|| self.try_auth(error, context))
            .or_else(|| self.try_store(error, context))
            .or_else(|| self.try_validation(error, context))
            .or_else(|| self.try_domain(error, context))
            .or_else(|| self.try_system(error, context))
            .unwrap_or(Verdict::new(
                ErrorKind::Unknown,
                Severity::Medium,
                true,
                1000,
                3,
            ));
        self.finish(verdict, error, context)
    }
}

/// Classifies a failure with the shared default [`RuleClassifier`].
///
/// The shared instance is built on first use; it is immutable and safe to
/// use from any thread.
pub fn classify(error: &RawError, context: &ErrorContext) -> Classification {
    static DEFAULT: OnceLock<RuleClassifier> = OnceLock::new();
    DEFAULT.get_or_init(RuleClassifier::new).classify(error, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorCategory;

    fn ctx(operation: &str) -> ErrorContext {
        ErrorContext::new(operation, "test")
    }

    // ==================== Network Branch Tests ====================

    #[test]
    fn test_offline_context_wins_over_everything() {
        let classification = classify(
            &RawError::coded("unavailable", "service unavailable"),
            &ctx("list_items").offline(),
        );
        assert_eq!(classification.kind, ErrorKind::NetworkOffline);
        assert_eq!(classification.severity, Severity::Critical);
        assert!(classification.retryable);
        assert_eq!(classification.retry_delay_ms, 5000);
        assert_eq!(classification.max_retries, 5);
    }

    #[test]
    fn test_offline_message() {
        let classification = classify(&RawError::new("host is offline"), &ctx("list_items"));
        assert_eq!(classification.kind, ErrorKind::NetworkOffline);
    }

    #[test]
    fn test_timeout_variants() {
        for raw in [
            RawError::new("request timed out"),
            RawError::new("operation timeout"),
            RawError::new("deadline exceeded"),
            RawError::coded("deadline-exceeded", "rpc failed"),
            RawError::coded("timeout", "rpc failed"),
        ] {
            let classification = classify(&raw, &ctx("load_item"));
            assert_eq!(
                classification.kind,
                ErrorKind::NetworkTimeout,
                "for {:?}",
                raw
            );
            assert_eq!(classification.severity, Severity::High);
            assert_eq!(classification.retry_delay_ms, 3000);
        }
    }

    #[test]
    fn test_generic_network() {
        for raw in [
            RawError::new("network error occurred"),
            RawError::new("connection refused"),
            RawError::new("failed to fetch"),
            RawError::new("DNS resolution failed"),
        ] {
            let classification = classify(&raw, &ctx("load_item"));
            assert_eq!(classification.kind, ErrorKind::Network, "for {:?}", raw);
            assert_eq!(classification.category, ErrorCategory::Network);
            assert_eq!(classification.retry_delay_ms, 2000);
            assert_eq!(classification.max_retries, 5);
        }
    }

    // ==================== Auth Branch Tests ====================

    #[test]
    fn test_popup_blocked_is_auth_required() {
        let classification = classify(
            &RawError::coded("auth/popup-blocked", "popup was blocked by the browser"),
            &ctx("sign_in"),
        );
        assert_eq!(classification.kind, ErrorKind::AuthRequired);
        assert_eq!(classification.severity, Severity::Medium);
        assert!(classification.retryable);
        assert_eq!(classification.max_retries, 2);
        assert_eq!(classification.retry_delay_ms, 1000);
    }

    #[test]
    fn test_popup_closed_is_auth_required() {
        for code in AUTH_INTERACTIVE_CODES {
            let classification = classify(&RawError::coded(*code, "sign-in aborted"), &ctx("sign_in"));
            assert_eq!(classification.kind, ErrorKind::AuthRequired, "for {}", code);
        }
    }

    #[test]
    fn test_auth_network_failure_reclassified_as_network() {
        let classification = classify(
            &RawError::coded("auth/network-request-failed", "sign-in aborted"),
            &ctx("sign_in"),
        );
        assert_eq!(classification.kind, ErrorKind::Network);
        assert_eq!(classification.severity, Severity::High);
        assert_eq!(classification.retry_delay_ms, 2000);
    }

    #[test]
    fn test_expired_tokens_not_retryable() {
        for code in AUTH_EXPIRED_CODES {
            let classification = classify(&RawError::coded(*code, "stale session"), &ctx("sign_in"));
            assert_eq!(classification.kind, ErrorKind::AuthExpired, "for {}", code);
            assert!(!classification.retryable);
        }
        let classification = classify(&RawError::new("session has expired"), &ctx("sign_in"));
        assert_eq!(classification.kind, ErrorKind::AuthExpired);
    }

    #[test]
    fn test_permission_denied() {
        let classification = classify(
            &RawError::coded("permission-denied", "missing rights"),
            &ctx("delete_item"),
        );
        assert_eq!(classification.kind, ErrorKind::PermissionDenied);
        assert_eq!(classification.severity, Severity::High);
        assert!(classification.retryable);
        assert_eq!(classification.max_retries, 1);

        let classification = classify(&RawError::new("access denied"), &ctx("delete_item"));
        assert_eq!(classification.kind, ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_auth_branch_fallback_is_generic_permission() {
        let classification = classify(
            &RawError::coded("auth/too-many-requests", "slow down"),
            &ctx("sign_in"),
        );
        assert_eq!(classification.kind, ErrorKind::Permission);
        assert_eq!(classification.severity, Severity::Medium);
        assert_eq!(classification.category, ErrorCategory::Authentication);
    }

    // ==================== Store Branch Tests ====================

    #[test]
    fn test_store_unavailable() {
        let classification = classify(
            &RawError::coded("unavailable", "backend could not be reached"),
            &ctx("write_doc"),
        );
        assert_eq!(classification.kind, ErrorKind::StoreUnavailable);
        assert_eq!(classification.severity, Severity::High);
        assert_eq!(classification.retry_delay_ms, 3000);
        assert_eq!(classification.max_retries, 5);
    }

    #[test]
    fn test_resource_exhausted_is_quota() {
        let classification = classify(
            &RawError::coded("resource-exhausted", "project quota used up"),
            &ctx("write_doc"),
        );
        assert_eq!(classification.kind, ErrorKind::StoreQuotaExceeded);
        assert_eq!(classification.severity, Severity::Critical);
        assert!(classification.retryable);
        assert_eq!(classification.retry_delay_ms, 10000);
        assert_eq!(classification.max_retries, 2);
    }

    #[test]
    fn test_failed_precondition_is_rules_denied() {
        let classification = classify(
            &RawError::coded("failed-precondition", "operation rejected"),
            &ctx("write_doc"),
        );
        assert_eq!(classification.kind, ErrorKind::StoreRulesDenied);
        assert_eq!(classification.severity, Severity::High);
        assert_eq!(classification.retry_delay_ms, 1000);
    }

    #[test]
    fn test_store_branch_fallback() {
        let classification = classify(
            &RawError::coded("aborted", "transaction contention"),
            &ctx("write_doc"),
        );
        assert_eq!(classification.kind, ErrorKind::Store);
        assert_eq!(classification.severity, Severity::Medium);
        assert_eq!(classification.retry_delay_ms, 2000);
        assert_eq!(classification.max_retries, 3);
    }

    // ==================== Validation Branch Tests ====================

    #[test]
    fn test_validation_required() {
        let classification = classify(&RawError::new("name is required"), &ctx("save_item"));
        assert_eq!(classification.kind, ErrorKind::ValidationRequired);
        assert_eq!(classification.severity, Severity::Low);
        assert!(!classification.retryable);
        assert_eq!(classification.max_retries, 0);
    }

    #[test]
    fn test_validation_format() {
        let classification = classify(
            &RawError::new("serial number has an invalid format"),
            &ctx("save_item"),
        );
        assert_eq!(classification.kind, ErrorKind::ValidationFormat);
        assert!(!classification.retryable);
    }

    #[test]
    fn test_validation_context_trigger() {
        // The operation marks this as a validation step even though the
        // message has no validation vocabulary.
        let classification = classify(
            &RawError::new("rejected by checks"),
            &ctx("validate_reservation"),
        );
        assert_eq!(classification.kind, ErrorKind::Validation);
        assert_eq!(classification.severity, Severity::Low);
    }

    #[test]
    fn test_validation_duplicate() {
        let classification = classify(
            &RawError::new("asset tag invalid: already in use"),
            &ctx("save_item"),
        );
        // "invalid" matches the format vocabulary first, per branch order
        assert_eq!(classification.kind, ErrorKind::ValidationFormat);

        let classification = classify(
            &RawError::new("duplicate asset tag"),
            &ctx("validate_item"),
        );
        assert_eq!(classification.kind, ErrorKind::ValidationDuplicate);
    }

    // ==================== Domain Branch Tests ====================

    #[test]
    fn test_domain_not_found() {
        let classification = classify(
            &RawError::new("borrower profile not found"),
            &ctx("load_profile"),
        );
        assert_eq!(classification.kind, ErrorKind::DomainNotFound);
        assert!(!classification.retryable);
        assert_eq!(classification.category, ErrorCategory::Domain);
    }

    #[test]
    fn test_domain_incomplete() {
        let classification = classify(
            &RawError::new("profile is incomplete"),
            &ctx("checkout_item"),
        );
        assert_eq!(classification.kind, ErrorKind::DomainIncomplete);
        assert!(!classification.retryable);
    }

    #[test]
    fn test_domain_duplicate() {
        let classification = classify(
            &RawError::new("a profile for this borrower already exists"),
            &ctx("create_profile"),
        );
        assert_eq!(classification.kind, ErrorKind::DomainDuplicate);
        assert!(!classification.retryable);
    }

    #[test]
    fn test_domain_fallback_retryable() {
        let classification = classify(&RawError::new("profile sync glitch"), &ctx("load_profile"));
        assert_eq!(classification.kind, ErrorKind::Domain);
        assert_eq!(classification.severity, Severity::Medium);
        assert!(classification.retryable);
        assert_eq!(classification.max_retries, 2);
    }

    // ==================== System and Fallback Tests ====================

    #[test]
    fn test_system_errors() {
        let classification = classify(&RawError::coded("internal", "oops"), &ctx("load_item"));
        assert_eq!(classification.kind, ErrorKind::System);
        assert_eq!(classification.severity, Severity::Critical);
        assert!(!classification.retryable);

        let classification = classify(
            &RawError::new("assertion failed: index in bounds"),
            &ctx("load_item"),
        );
        assert_eq!(classification.kind, ErrorKind::System);
    }

    #[test]
    fn test_unknown_fallback() {
        let classification = classify(&RawError::new("something odd happened"), &ctx("load_item"));
        assert_eq!(classification.kind, ErrorKind::Unknown);
        assert_eq!(classification.category, ErrorCategory::General);
        assert_eq!(classification.severity, Severity::Medium);
        assert!(classification.retryable);
        assert_eq!(classification.max_retries, 3);
        assert_eq!(classification.retry_delay_ms, 1000);
    }

    #[test]
    fn test_classifier_is_total_on_empty_input() {
        let classification = classify(&RawError::new(""), &ErrorContext::default());
        assert_eq!(classification.kind, ErrorKind::Unknown);
    }

    // ==================== Determinism and Ordering Tests ====================

    #[test]
    fn test_classification_is_deterministic() {
        let raw = RawError::coded("unavailable", "backend could not be reached");
        let context = ctx("write_doc");
        let first = classify(&raw, &context);
        let second = classify(&raw, &context);
        assert_eq!(first.kind, second.kind);
        assert_eq!(first.category, second.category);
        assert_eq!(first.retryable, second.retryable);
        assert_eq!(first.max_retries, second.max_retries);
    }

    #[test]
    fn test_network_detection_precedes_auth() {
        // Contains auth vocabulary, but the connection failure should win.
        let classification = classify(
            &RawError::new("connection reset during sign-in, unauthorized"),
            &ctx("sign_in"),
        );
        assert_eq!(classification.kind, ErrorKind::Network);
    }

    #[test]
    fn test_auth_precedes_store() {
        let classification = classify(
            &RawError::coded("unauthenticated", "database rejected the call"),
            &ctx("write_doc"),
        );
        assert_eq!(classification.category, ErrorCategory::Authentication);
    }

    #[test]
    fn test_provenance_carried_through() {
        let raw = RawError::coded("aborted", "transaction contention");
        let context = ctx("write_doc").with_extra("doc_id", "loans/42");
        let classification = classify(&raw, &context);
        assert_eq!(classification.original, raw);
        assert_eq!(classification.context.extra.get("doc_id").unwrap(), "loans/42");
    }
}
