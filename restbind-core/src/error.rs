//! Error types for restbind
//!
//! This module provides the error taxonomy shared by the server and client
//! halves of the binding layer. It defines two main types:
//!
//! - **Error**: Application-level errors for internal use (uses thiserror)
//! - **ErrorOutcome**: Wire-format errors, shaped as a FHIR `OperationOutcome`
//!
//! # Error Categories
//!
//! Every `Error` belongs to exactly one [`ErrorCategory`]:
//!
//! - **Configuration**: a malformed handler signature or overlapping
//!   descriptors. Raised while the dispatcher is being built and never seen
//!   by a client.
//! - **Client**: bad input on a single request (wrong resource type, missing
//!   content type, malformed query parameter). Becomes a 4xx response.
//! - **InvariantViolation**: a programming defect such as a null identity
//!   reaching the binder after matching claimed success. Becomes a 500 and is
//!   logged at error level.
//! - **Internal**: handler, serialization and transport failures.
//!
//! # Examples
//!
//! ```rust
//! use restbind_core::{Error, ErrorCategory};
//!
//! let error = Error::ResourceTypeMismatch {
//!     expected: "Patient".into(),
//!     found: "Observation".into(),
//! };
//! assert_eq!(error.category(), ErrorCategory::Client);
//! assert_eq!(error.status().as_u16(), 400);
//!
//! let outcome = error.to_outcome();
//! assert_eq!(outcome.issue[0].code, "invalid");
//! ```

use crate::types::PatchEncoding;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for restbind operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`]
///
/// Monitoring uses the category to separate "bad client input" from
/// "internal defect" without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Registration-time failure; must abort startup
    Configuration,
    /// Per-request failure caused by the caller's input
    Client,
    /// Per-request failure caused by a programming defect
    InvariantViolation,
    /// Handler, serialization or transport failure
    Internal,
}

impl ErrorCategory {
    /// Stable label used in logs and metric attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Client => "client",
            ErrorCategory::InvariantViolation => "invariant_violation",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-level error type for restbind operations
///
/// Variants carry enough context (expected vs. found values, parameter
/// names, handler names) to produce an actionable diagnostic. They can be
/// converted into an [`ErrorOutcome`] for transmission over the wire.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed handler signature detected at registration
    #[error("Configuration error in handler '{handler}': {reason}")]
    Configuration {
        /// Name of the offending handler
        handler: String,
        /// What is wrong with its signature
        reason: String,
    },

    /// Two registered operations accept the same requests
    #[error("Ambiguous binding: operations '{first}' and '{second}' both match the same requests")]
    AmbiguousBinding {
        /// First overlapping operation
        first: String,
        /// Second overlapping operation
        second: String,
    },

    /// Generic malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The resource type on the request or identity conflicts with the
    /// operation's configured type
    #[error("ID parameter has the wrong resource type, expected '{expected}', found '{found}'")]
    ResourceTypeMismatch {
        /// Resource type the operation is bound to
        expected: String,
        /// Resource type the caller supplied
        found: String,
    },

    /// Content-Type header missing or not one of the patch encodings
    #[error(
        "Unsupported patch content type: {} (supported: {})",
        .found.as_deref().unwrap_or("<missing>"),
        .supported.join(", ")
    )]
    UnsupportedContentType {
        /// Raw header value, if one was sent
        found: Option<String>,
        /// Content types the operation accepts
        supported: Vec<String>,
    },

    /// A required query parameter was not supplied
    #[error("Missing required query parameter '{name}'")]
    MissingQueryParameter {
        /// Parameter name
        name: String,
    },

    /// A query parameter could not be converted to its declared type
    #[error("Invalid value '{value}' for query parameter '{name}': {reason}")]
    InvalidQueryParameter {
        /// Parameter name
        name: String,
        /// Raw value as received
        value: String,
        /// Why conversion failed
        reason: String,
    },

    /// A client-side argument does not fit its declared slot
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No registered operation accepts this verb and path
    #[error("No operation found for {verb} {path}")]
    OperationNotFound {
        /// Request verb
        verb: String,
        /// Request path
        path: String,
    },

    /// The path is served, but not with this verb
    #[error("Method {verb} not allowed for {path} (allowed: {})", .allowed.join(", "))]
    MethodNotAllowed {
        /// Request verb
        verb: String,
        /// Request path
        path: String,
        /// Verbs registered for this path
        allowed: Vec<String>,
    },

    /// Request body exceeds the configured limit
    #[error("Payload too large: limit={limit}, actual={actual}")]
    PayloadTooLarge {
        /// Configured maximum body size in bytes
        limit: usize,
        /// Size of the rejected body
        actual: usize,
    },

    /// Internal defect: state that matching or registration should have
    /// made impossible
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Handler failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failure reported by the transport collaborator
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error response received from a remote server
    #[error("Remote error (HTTP {status}): {outcome}")]
    Remote {
        /// HTTP status of the response
        status: u16,
        /// Decoded `OperationOutcome` body
        outcome: ErrorOutcome,
    },
}

impl Error {
    /// Build a configuration error for the named handler
    pub fn configuration(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Configuration {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Build an unsupported content type error listing the given encodings
    pub fn unsupported_content_type(found: Option<&str>, supported: &[PatchEncoding]) -> Self {
        Error::UnsupportedContentType {
            found: found.map(str::to_string),
            supported: supported
                .iter()
                .map(|encoding| encoding.content_type().to_string())
                .collect(),
        }
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Configuration { .. } | Error::AmbiguousBinding { .. } => {
                ErrorCategory::Configuration
            }
            Error::InvalidRequest(_)
            | Error::ResourceTypeMismatch { .. }
            | Error::UnsupportedContentType { .. }
            | Error::MissingQueryParameter { .. }
            | Error::InvalidQueryParameter { .. }
            | Error::InvalidArgument(_)
            | Error::OperationNotFound { .. }
            | Error::MethodNotAllowed { .. }
            | Error::PayloadTooLarge { .. } => ErrorCategory::Client,
            Error::InvariantViolation(_) => ErrorCategory::InvariantViolation,
            Error::Remote { status, .. } if (400..500).contains(status) => ErrorCategory::Client,
            Error::Internal(_)
            | Error::Serialization(_)
            | Error::Transport(_)
            | Error::Remote { .. } => ErrorCategory::Internal,
        }
    }

    /// HTTP status code this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            Error::OperationNotFound { .. } => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::UnsupportedContentType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::InvalidRequest(_)
            | Error::ResourceTypeMismatch { .. }
            | Error::MissingQueryParameter { .. }
            | Error::InvalidQueryParameter { .. }
            | Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
            Error::Remote { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Error::Configuration { .. }
            | Error::AmbiguousBinding { .. }
            | Error::InvariantViolation(_)
            | Error::Internal(_)
            | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to the wire representation
    pub fn to_outcome(&self) -> ErrorOutcome {
        if let Error::Remote { outcome, .. } = self {
            return outcome.clone();
        }

        let (severity, code) = match self {
            Error::Configuration { .. }
            | Error::AmbiguousBinding { .. }
            | Error::InvariantViolation(_) => (IssueSeverity::Fatal, "exception"),
            Error::InvalidRequest(_)
            | Error::ResourceTypeMismatch { .. }
            | Error::InvalidArgument(_) => (IssueSeverity::Error, "invalid"),
            Error::UnsupportedContentType { .. } | Error::MethodNotAllowed { .. } => {
                (IssueSeverity::Error, "not-supported")
            }
            Error::MissingQueryParameter { .. } => (IssueSeverity::Error, "required"),
            Error::InvalidQueryParameter { .. } => (IssueSeverity::Error, "value"),
            Error::OperationNotFound { .. } => (IssueSeverity::Error, "not-found"),
            Error::PayloadTooLarge { .. } => (IssueSeverity::Error, "too-long"),
            Error::Transport(_) => (IssueSeverity::Error, "transient"),
            Error::Internal(_) | Error::Serialization(_) | Error::Remote { .. } => {
                (IssueSeverity::Error, "exception")
            }
        };

        ErrorOutcome::new(severity, code, self.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Severity of an [`OutcomeIssue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// The issue caused the action to fail and no further checking was done
    Fatal,
    /// The issue is sufficiently important to cause the action to fail
    Error,
    /// The issue is not important enough to fail the action
    Warning,
    /// Informational only
    Information,
}

/// One issue inside an [`ErrorOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeIssue {
    /// How serious the issue is
    pub severity: IssueSeverity,
    /// FHIR issue-type code, e.g. `invalid`, `not-supported`, `exception`
    pub code: String,
    /// Human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

/// Error body as it appears on the wire
///
/// Shaped as a FHIR `OperationOutcome` resource so that any conformant client
/// can render it:
///
/// ```json
/// {"resourceType":"OperationOutcome","issue":[{"severity":"error","code":"invalid","diagnostics":"..."}]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutcome {
    /// Always `OperationOutcome`
    pub resource_type: String,
    /// Issues, most severe first
    pub issue: Vec<OutcomeIssue>,
}

impl ErrorOutcome {
    /// Create an outcome with a single issue
    pub fn new(severity: IssueSeverity, code: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue: vec![OutcomeIssue {
                severity,
                code: code.into(),
                diagnostics: Some(diagnostics.into()),
            }],
        }
    }

    /// Diagnostics of the first issue, if any
    pub fn diagnostics(&self) -> Option<&str> {
        self.issue.first().and_then(|issue| issue.diagnostics.as_deref())
    }
}

impl fmt::Display for ErrorOutcome {
    /// Formats as "[code] diagnostics" for the first issue
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issue.first() {
            Some(issue) => write!(
                f,
                "[{}] {}",
                issue.code,
                issue.diagnostics.as_deref().unwrap_or("")
            ),
            None => write!(f, "[unknown] empty OperationOutcome"),
        }
    }
}

impl std::error::Error for ErrorOutcome {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_serde() {
        let serde_error = serde_json::from_str::<serde_json::Value>(r#"{"invalid": json"#).unwrap_err();
        let error: Error = serde_error.into();

        match error {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_type_mismatch_names_both_types() {
        let error = Error::ResourceTypeMismatch {
            expected: "Patient".to_string(),
            found: "Observation".to_string(),
        };
        let display = error.to_string();

        assert!(display.contains("'Patient'"));
        assert!(display.contains("'Observation'"));
        assert_eq!(error.category(), ErrorCategory::Client);
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unsupported_content_type_message() {
        let error = Error::unsupported_content_type(Some("text/plain"), &[PatchEncoding::JsonPatch]);
        let display = error.to_string();

        assert!(display.contains("text/plain"));
        assert!(display.contains("application/json-patch+json"));
        assert_eq!(error.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let missing = Error::unsupported_content_type(None, &PatchEncoding::ALL);
        assert!(missing.to_string().contains("<missing>"));
    }

    #[test]
    fn test_categories() {
        let cases = vec![
            (Error::configuration("h", "no body"), ErrorCategory::Configuration),
            (
                Error::AmbiguousBinding {
                    first: "a".into(),
                    second: "b".into(),
                },
                ErrorCategory::Configuration,
            ),
            (Error::InvalidRequest("x".into()), ErrorCategory::Client),
            (
                Error::MissingQueryParameter { name: "q".into() },
                ErrorCategory::Client,
            ),
            (
                Error::InvariantViolation("null id".into()),
                ErrorCategory::InvariantViolation,
            ),
            (Error::Internal("boom".into()), ErrorCategory::Internal),
            (Error::Transport("reset".into()), ErrorCategory::Internal),
        ];

        for (error, expected) in cases {
            assert_eq!(error.category(), expected, "{error}");
        }
    }

    #[test]
    fn test_remote_error_category_follows_status() {
        let outcome = ErrorOutcome::new(IssueSeverity::Error, "invalid", "bad");
        let client = Error::Remote {
            status: 400,
            outcome: outcome.clone(),
        };
        let server = Error::Remote { status: 503, outcome };

        assert_eq!(client.category(), ErrorCategory::Client);
        assert_eq!(server.category(), ErrorCategory::Internal);
        assert_eq!(server.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_status_mapping() {
        let not_found = Error::OperationNotFound {
            verb: "PATCH".into(),
            path: "/Foo/1".into(),
        };
        let not_allowed = Error::MethodNotAllowed {
            verb: "GET".into(),
            path: "/Patient/1".into(),
            allowed: vec!["PATCH".into()],
        };
        let too_large = Error::PayloadTooLarge { limit: 10, actual: 20 };

        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_allowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(not_allowed.to_string().contains("PATCH"));
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            Error::InvariantViolation("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_outcome_codes() {
        let outcome = Error::InvariantViolation("identity can not be null".into()).to_outcome();
        assert_eq!(outcome.resource_type, "OperationOutcome");
        assert_eq!(outcome.issue[0].severity, IssueSeverity::Fatal);
        assert_eq!(outcome.issue[0].code, "exception");
        assert!(outcome.diagnostics().unwrap().contains("identity can not be null"));

        let outcome = Error::MissingQueryParameter { name: "_format".into() }.to_outcome();
        assert_eq!(outcome.issue[0].code, "required");
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = ErrorOutcome::new(IssueSeverity::Error, "invalid", "Bad id");
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["resourceType"], "OperationOutcome");
        assert_eq!(json["issue"][0]["severity"], "error");
        assert_eq!(json["issue"][0]["code"], "invalid");
        assert_eq!(json["issue"][0]["diagnostics"], "Bad id");
    }

    #[test]
    fn test_outcome_deserialization() {
        let json = r#"{"resourceType":"OperationOutcome","issue":[{"severity":"fatal","code":"exception"}]}"#;
        let outcome: ErrorOutcome = serde_json::from_str(json).unwrap();

        assert_eq!(outcome.issue[0].severity, IssueSeverity::Fatal);
        assert!(outcome.diagnostics().is_none());
        assert_eq!(outcome.to_string(), "[exception] ");
    }

    #[test]
    fn test_remote_keeps_outcome() {
        let outcome = ErrorOutcome::new(IssueSeverity::Error, "not-found", "gone");
        let error = Error::Remote {
            status: 404,
            outcome: outcome.clone(),
        };
        assert_eq!(error.to_outcome(), outcome);
        assert!(error.to_string().contains("404"));
    }
}
