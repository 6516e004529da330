//! Error types for notemirror.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using notemirror's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for notemirror operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Referenced resource (link, integration, record) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bucket not found
    #[error("Bucket not found: {0}")]
    BucketNotFound(Uuid),

    /// Bucket type / vendor entity type combination has no implementation
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// Backend record is malformed (missing field, undecodable value)
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Vendor failure that may succeed later (rate limit, timeout)
    #[error("Vendor transient error: {message}")]
    VendorTransient {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Vendor refused the operation for good
    #[error("Vendor error: {0}")]
    VendorPermanent(String),

    /// Routing template failed to compile
    #[error("Template error: {0}")]
    Template(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a transient vendor error without a retry hint.
    pub fn transient(message: impl Into<String>) -> Self {
        Error::VendorTransient {
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::VendorTransient { .. })
    }

    /// Structural errors abort the current request instead of being skipped.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::BucketNotFound(_) | Error::UnsupportedAction(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::transient(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("link abc".to_string());
        assert_eq!(err.to_string(), "Not found: link abc");
    }

    #[test]
    fn test_error_display_bucket_not_found() {
        let id = Uuid::nil();
        let err = Error::BucketNotFound(id);
        assert_eq!(err.to_string(), format!("Bucket not found: {}", id));
    }

    #[test]
    fn test_error_display_vendor_transient() {
        let err = Error::VendorTransient {
            message: "Too Many Requests".to_string(),
            retry_after_secs: Some(3),
        };
        assert_eq!(err.to_string(), "Vendor transient error: Too Many Requests");
    }

    #[test]
    fn test_error_display_template() {
        let err = Error::Template("unclosed placeholder".to_string());
        assert_eq!(err.to_string(), "Template error: unclosed placeholder");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::transient("timeout").is_transient());
        assert!(!Error::VendorPermanent("forbidden".into()).is_transient());
        assert!(!Error::InvalidResource("no title".into()).is_transient());
    }

    #[test]
    fn test_structural_classification() {
        assert!(Error::NotFound("x".into()).is_structural());
        assert!(Error::BucketNotFound(Uuid::nil()).is_structural());
        assert!(Error::UnsupportedAction("x".into()).is_structural());
        assert!(!Error::InvalidResource("x".into()).is_structural());
        assert!(!Error::transient("x").is_structural());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
