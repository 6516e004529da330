//! Notion-specific error handling.

use notemirror_core::Error;

/// Notion-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotionErrorCode {
    /// Integration secret rejected.
    Unauthorized,
    /// The integration has no access to the resource.
    RestrictedResource,
    /// Page or database does not exist (or is not shared).
    ObjectNotFound,
    /// Request body failed schema validation.
    ValidationError,
    /// Concurrent write conflict.
    Conflict,
    /// Rate limit exceeded.
    RateLimited,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl NotionErrorCode {
    /// Determine error code from HTTP status and Notion error code.
    pub fn from_response(status: u16, code: &str) -> Self {
        match (status, code) {
            (401, _) | (_, "unauthorized") => Self::Unauthorized,
            (429, _) | (_, "rate_limited") => Self::RateLimited,
            (404, _) | (_, "object_not_found") => Self::ObjectNotFound,
            (403, _) | (_, "restricted_resource") => Self::RestrictedResource,
            (409, _) | (_, "conflict_error") => Self::Conflict,
            (400, _) => Self::ValidationError,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerError | Self::Conflict)
    }
}

/// Convert a Notion error to a notemirror Error.
pub fn to_notemirror_error(
    code: NotionErrorCode,
    message: &str,
    retry_after: Option<u64>,
) -> Error {
    match code {
        NotionErrorCode::Unauthorized => {
            Error::Config(format!("Notion authentication failed: {}", message))
        }
        NotionErrorCode::RateLimited => Error::VendorTransient {
            message: format!("Notion rate limit: {}", message),
            retry_after_secs: retry_after,
        },
        NotionErrorCode::ServerError | NotionErrorCode::Conflict => {
            Error::transient(format!("Notion unavailable: {}", message))
        }
        NotionErrorCode::ObjectNotFound => Error::NotFound(format!("Notion: {}", message)),
        NotionErrorCode::ValidationError => {
            Error::InvalidResource(format!("Notion rejected request: {}", message))
        }
        NotionErrorCode::RestrictedResource | NotionErrorCode::Unknown => {
            Error::VendorPermanent(format!("Notion: {}", message))
        }
    }
}
