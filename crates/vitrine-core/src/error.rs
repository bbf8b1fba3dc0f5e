//! Error types for Vitrine operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Vitrine crates. Uses `thiserror` for derive macros.
//!
//! Absent documents are not errors: loaders model them as `None`.

use thiserror::Error;

use crate::context::ExecutionContext;

/// Boxed source error carried by fetch failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in Vitrine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Required configuration is missing or invalid. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A privileged or context-bound operation was attempted from the wrong
    /// execution context.
    #[error("Environment violation: {operation} is not allowed in the {context} context")]
    EnvironmentViolation {
        /// The rejected operation.
        operation: String,
        /// The context it was attempted from.
        context: ExecutionContext,
    },

    /// A content query failed (transport, HTTP status, or malformed payload).
    #[error("Content fetch failed for `{query}`: {message}")]
    ContentFetch {
        /// Name of the failing query.
        query: String,
        /// Human-readable cause.
        message: String,
        /// HTTP status, when the store answered.
        status: Option<u16>,
        /// Whether retrying may succeed.
        retryable: bool,
        /// Underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// A query name that is not registered in the catalog.
    #[error("Unknown query: {0}")]
    UnknownQuery(String),

    /// The change stream failed or closed unexpectedly.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// An operation was called in a state that does not allow it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an environment violation for `operation` attempted in `context`.
    pub fn environment_violation(operation: impl Into<String>, context: ExecutionContext) -> Self {
        Self::EnvironmentViolation {
            operation: operation.into(),
            context,
        }
    }

    /// Create a non-retryable fetch error (e.g. a malformed response).
    pub fn fetch(query: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ContentFetch {
            query: query.into(),
            message: msg.into(),
            status: None,
            retryable: false,
            source: None,
        }
    }

    /// Create a fetch error from a transport failure. Always retryable.
    pub fn fetch_transport(
        query: impl Into<String>,
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ContentFetch {
            query: query.into(),
            message: msg.into(),
            status: None,
            retryable: true,
            source: Some(Box::new(source)),
        }
    }

    /// Create a fetch error from a non-success HTTP status.
    ///
    /// 429 and 5xx are retryable; other statuses are not.
    pub fn fetch_status(query: impl Into<String>, status: u16, msg: impl Into<String>) -> Self {
        Self::ContentFetch {
            query: query.into(),
            message: msg.into(),
            status: Some(status),
            retryable: status == 429 || status >= 500,
            source: None,
        }
    }

    /// Create a subscription error.
    pub fn subscription(msg: impl Into<String>) -> Self {
        Self::Subscription(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Whether retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ContentFetch { retryable, .. } => *retryable,
            Self::Subscription(_) => true,
            _ => false,
        }
    }

    /// Whether the error must stop the process or call path outright.
    ///
    /// Fatal errors are never degraded to defaults.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::EnvironmentViolation { .. }
        )
    }

    /// Whether this is a content fetch failure.
    pub fn is_content_fetch(&self) -> bool {
        matches!(self, Self::ContentFetch { .. })
    }

    /// The HTTP status attached to a fetch failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ContentFetch { status, .. } => *status,
            _ => None,
        }
    }
}

/// Result type alias using Vitrine's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_status_retryable() {
        assert!(Error::fetch_status("homePage", 503, "unavailable").is_retryable());
        assert!(Error::fetch_status("homePage", 429, "slow down").is_retryable());
        assert!(!Error::fetch_status("homePage", 400, "bad query").is_retryable());
        assert!(!Error::fetch_status("homePage", 401, "unauthorized").is_retryable());
    }

    #[test]
    fn test_fetch_transport_retryable_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::fetch_transport("settings", "connection failed", io);
        assert!(err.is_retryable());
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_malformed_not_retryable() {
        let err = Error::fetch("homePage", "missing result");
        assert!(!err.is_retryable());
        assert!(err.is_content_fetch());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(Error::config("missing project id").is_fatal());
        assert!(Error::environment_violation("read token", ExecutionContext::Client).is_fatal());
        assert!(!Error::fetch("homePage", "boom").is_fatal());
        assert!(!Error::UnknownQuery("nope".into()).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::environment_violation("reading the read token", ExecutionContext::Client);
        assert_eq!(
            err.to_string(),
            "Environment violation: reading the read token is not allowed in the client context"
        );

        let err = Error::fetch_status("homePage", 500, "HTTP 500");
        assert_eq!(
            err.to_string(),
            "Content fetch failed for `homePage`: HTTP 500"
        );
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
