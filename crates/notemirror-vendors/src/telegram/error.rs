//! Telegram-specific error handling.
//!
//! The Bot API reports most failures as `400 Bad Request` with a free-form
//! description, so classification keys on the description text.

use notemirror_core::Error;

/// Telegram-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramErrorCode {
    /// Edit carried the exact text already shown.
    MessageNotModified,
    /// Message is too old or not owned by the bot.
    MessageCantBeEdited,
    /// Message no longer exists.
    MessageNotFound,
    /// Deletion refused (older than 48h, or missing rights).
    MessageCantBeDeleted,
    /// Flood control; carries `retry_after`.
    RateLimited,
    /// Bot token rejected.
    Unauthorized,
    /// Bot was removed from the chat or the chat is gone.
    ChatUnavailable,
    /// Telegram-side failure.
    ServerError,
    /// Transport failure before a response arrived.
    Network,
    /// Anything else.
    Unknown,
}

impl TelegramErrorCode {
    /// Determine error code from HTTP status and description.
    pub fn from_response(status: u16, description: &str) -> Self {
        let description = description.to_lowercase();
        match status {
            429 => Self::RateLimited,
            401 => Self::Unauthorized,
            500..=599 => Self::ServerError,
            _ if description.contains("message is not modified") => Self::MessageNotModified,
            _ if description.contains("message can't be edited") => Self::MessageCantBeEdited,
            _ if description.contains("message to edit not found")
                || description.contains("message to delete not found")
                || description.contains("message to react not found") =>
            {
                Self::MessageNotFound
            }
            _ if description.contains("message can't be deleted") => Self::MessageCantBeDeleted,
            403 => Self::ChatUnavailable,
            _ if description.contains("chat not found") => Self::ChatUnavailable,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerError | Self::Network)
    }
}

/// A failed Bot API call.
#[derive(Debug, Clone, thiserror::Error)]
#[error("telegram {code:?}: {description}")]
pub struct TelegramError {
    pub code: TelegramErrorCode,
    pub description: String,
    pub retry_after: Option<u64>,
}

impl TelegramError {
    pub fn new(code: TelegramErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            code: TelegramErrorCode::RateLimited,
            description: format!("Too Many Requests: retry after {}", retry_after),
            retry_after: Some(retry_after),
        }
    }
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(TelegramErrorCode::Network, e.to_string())
    }
}

impl From<TelegramError> for Error {
    fn from(e: TelegramError) -> Self {
        to_notemirror_error(e.code, &e.description, e.retry_after)
    }
}

/// Convert a Telegram error to a notemirror Error.
pub fn to_notemirror_error(
    code: TelegramErrorCode,
    message: &str,
    retry_after: Option<u64>,
) -> Error {
    match code {
        TelegramErrorCode::RateLimited => Error::VendorTransient {
            message: format!("Telegram rate limit: {}", message),
            retry_after_secs: retry_after,
        },
        TelegramErrorCode::ServerError | TelegramErrorCode::Network => {
            Error::transient(format!("Telegram unavailable: {}", message))
        }
        TelegramErrorCode::Unauthorized => {
            Error::Config(format!("Telegram authentication failed: {}", message))
        }
        _ => Error::VendorPermanent(format!("Telegram: {}", message)),
    }
}
