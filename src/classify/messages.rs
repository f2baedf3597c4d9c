//! User-facing display bundles for classified failures.
//!
//! Every taxonomy member maps to exactly one bundle through an exhaustive
//! `match`: adding an [`ErrorKind`] without a bundle is a compile error, not
//! a runtime fallback. The UI renders surfaced failures from these bundles
//! alone, so every failure has a title, message, and suggestion regardless
//! of its root cause.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Classification, ErrorKind, Severity};

/// Static display text for one taxonomy member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MessageBundle {
    /// Short heading, e.g. "Connection Problem".
    pub title: &'static str,
    /// One-sentence description of what went wrong.
    pub message: &'static str,
    /// What the user can do about it.
    pub suggestion: &'static str,
    /// Icon name for the UI, e.g. "wifi-off".
    pub icon: &'static str,
}

/// A display bundle combined with the classification's passthrough fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Short heading.
    pub title: String,
    /// One-sentence description.
    pub message: String,
    /// Suggested user action.
    pub suggestion: String,
    /// Icon name for the UI.
    pub icon: String,
    /// Severity, passed through from the classification.
    pub severity: Severity,
    /// Raw retryability flag, passed through from the classification.
    pub retryable: bool,
    /// When the failure was classified.
    pub timestamp: DateTime<Utc>,
}

/// Returns the display bundle for a taxonomy member.
pub fn bundle(kind: ErrorKind) -> MessageBundle {
    match kind {
        ErrorKind::Network => MessageBundle {
            title: "Connection Problem",
            message: "We couldn't reach the server.",
            suggestion: "Check your connection and try again.",
            icon: "wifi-off",
        },
        ErrorKind::NetworkTimeout => MessageBundle {
            title: "Request Timed Out",
            message: "The server took too long to respond.",
            suggestion: "Try again in a moment.",
            icon: "clock",
        },
        ErrorKind::NetworkOffline => MessageBundle {
            title: "You're Offline",
            message: "No internet connection was detected.",
            suggestion: "Reconnect to the internet and try again.",
            icon: "wifi-off",
        },
        ErrorKind::AuthRequired => MessageBundle {
            title: "Sign-In Needed",
            message: "The sign-in window was closed or blocked.",
            suggestion: "Allow popups for this site and sign in again.",
            icon: "log-in",
        },
        ErrorKind::AuthExpired => MessageBundle {
            title: "Session Expired",
            message: "Your session is no longer valid.",
            suggestion: "Sign in again to continue.",
            icon: "log-in",
        },
        ErrorKind::PermissionDenied => MessageBundle {
            title: "Access Denied",
            message: "You don't have permission for this action.",
            suggestion: "Contact an administrator if you need access.",
            icon: "shield-off",
        },
        ErrorKind::Permission => MessageBundle {
            title: "Sign-In Problem",
            message: "Something went wrong while checking your access.",
            suggestion: "Try signing in again.",
            icon: "shield",
        },
        ErrorKind::Validation => MessageBundle {
            title: "Check Your Input",
            message: "Some of the entered information isn't valid.",
            suggestion: "Review the highlighted fields and try again.",
            icon: "alert-circle",
        },
        ErrorKind::ValidationRequired => MessageBundle {
            title: "Missing Information",
            message: "A required field is empty.",
            suggestion: "Fill in the highlighted fields.",
            icon: "alert-circle",
        },
        ErrorKind::ValidationFormat => MessageBundle {
            title: "Invalid Format",
            message: "A field doesn't match the expected format.",
            suggestion: "Correct the highlighted fields and try again.",
            icon: "alert-circle",
        },
        ErrorKind::ValidationDuplicate => MessageBundle {
            title: "Already Exists",
            message: "This value is already in use.",
            suggestion: "Choose a different value.",
            icon: "copy",
        },
        ErrorKind::Store => MessageBundle {
            title: "Storage Problem",
            message: "The data store reported an error.",
            suggestion: "Try again; if it keeps happening, contact support.",
            icon: "database",
        },
        ErrorKind::StoreUnavailable => MessageBundle {
            title: "Service Unavailable",
            message: "The data store is temporarily unavailable.",
            suggestion: "Wait a moment and try again.",
            icon: "server-off",
        },
        ErrorKind::StoreQuotaExceeded => MessageBundle {
            title: "Service Busy",
            message: "The service is over its usage limits right now.",
            suggestion: "Wait a few minutes before trying again.",
            icon: "gauge",
        },
        ErrorKind::StoreRulesDenied => MessageBundle {
            title: "Operation Rejected",
            message: "The data store rejected this change.",
            suggestion: "Refresh the page and try again.",
            icon: "database",
        },
        ErrorKind::DomainNotFound => MessageBundle {
            title: "Profile Not Found",
            message: "We couldn't find the requested borrower profile.",
            suggestion: "Check the details or create a new profile.",
            icon: "user-x",
        },
        ErrorKind::DomainIncomplete => MessageBundle {
            title: "Profile Incomplete",
            message: "The borrower profile is missing required details.",
            suggestion: "Complete the profile before borrowing equipment.",
            icon: "user",
        },
        ErrorKind::DomainDuplicate => MessageBundle {
            title: "Profile Already Exists",
            message: "A profile already exists for this borrower.",
            suggestion: "Open the existing profile instead.",
            icon: "users",
        },
        ErrorKind::Domain => MessageBundle {
            title: "Profile Problem",
            message: "Something went wrong with the borrower profile.",
            suggestion: "Try again in a moment.",
            icon: "user",
        },
        ErrorKind::CircuitOpen => MessageBundle {
            title: "Service Paused",
            message: "Requests are paused after repeated failures.",
            suggestion: "Wait a minute before trying again.",
            icon: "pause-circle",
        },
        ErrorKind::Cancelled => MessageBundle {
            title: "Cancelled",
            message: "The operation was cancelled.",
            suggestion: "Start over if you still need this.",
            icon: "x-circle",
        },
        ErrorKind::Unknown => MessageBundle {
            title: "Something Went Wrong",
            message: "An unexpected error occurred.",
            suggestion: "Try again; if it keeps happening, contact support.",
            icon: "help-circle",
        },
        ErrorKind::System => MessageBundle {
            title: "Application Error",
            message: "An internal error occurred.",
            suggestion: "Reload the page; if it keeps happening, contact support.",
            icon: "alert-triangle",
        },
    }
}

/// Builds the user-facing message for a classification, combining its
/// display bundle with the severity, retryability, and timestamp.
pub fn error_message(classification: &Classification) -> ErrorMessage {
    let bundle = bundle(classification.kind);
    ErrorMessage {
        title: bundle.title.to_string(),
        message: bundle.message.to_string(),
        suggestion: bundle.suggestion.to_string(),
        icon: bundle.icon.to_string(),
        severity: classification.severity,
        retryable: classification.retryable,
        timestamp: classification.timestamp,
    }
}
