//! Telegram Bot API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use notemirror_core::defaults::{
    TELEGRAM_API_URL, TELEGRAM_MAX_RETRIES, TELEGRAM_MAX_RETRY_AFTER_SECS, TELEGRAM_TIMEOUT_SECS,
};
use notemirror_core::{Error, Result};

use super::error::{TelegramError, TelegramErrorCode};
use super::types::*;

pub type TelegramResult<T> = std::result::Result<T, TelegramError>;

/// Configuration for the Telegram client.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot API base URL (without the `/bot<token>` segment).
    pub base_url: String,
    /// Fallback bot token when the integration carries none.
    pub bot_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// How many times a rate-limited call is repeated.
    pub max_retries: u32,
    /// Upper bound on a single `retry_after` sleep.
    pub max_retry_after_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            base_url: TELEGRAM_API_URL.to_string(),
            bot_token: None,
            timeout_seconds: TELEGRAM_TIMEOUT_SECS,
            max_retries: TELEGRAM_MAX_RETRIES,
            max_retry_after_secs: TELEGRAM_MAX_RETRY_AFTER_SECS,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("base_url", &self.base_url)
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_retries", &self.max_retries)
            .field("max_retry_after_secs", &self.max_retry_after_secs)
            .finish()
    }
}

impl TelegramConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TELEGRAM_API_URL").unwrap_or(defaults.base_url),
            bot_token: std::env::var("TELEGRAM_BOT_TOKEN").ok(),
            timeout_seconds: std::env::var("TELEGRAM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
            max_retries: std::env::var("TELEGRAM_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            max_retry_after_secs: std::env::var("TELEGRAM_MAX_RETRY_AFTER_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retry_after_secs),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_bot_token(mut self, token: impl Into<String>) -> Self {
        self.bot_token = Some(token.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_retry_after_secs(mut self, secs: u64) -> Self {
        self.max_retry_after_secs = secs;
        self
    }
}

/// The Bot API calls the chat adapter needs.
#[async_trait]
pub trait TelegramApi: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<Message>;

    async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str)
        -> TelegramResult<()>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TelegramResult<()>;

    /// Set the bot's reaction on a message; `None` clears it.
    async fn set_message_reaction(
        &self,
        chat_id: i64,
        message_id: i64,
        emoji: Option<&str>,
    ) -> TelegramResult<()>;
}

/// reqwest-backed Bot API client.
pub struct TelegramClient {
    client: Client,
    config: TelegramConfig,
    token: String,
}

impl TelegramClient {
    /// Create a new client. The config must carry a bot token.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let token = config
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config("Telegram bot token is not configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            token,
        })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    /// Call a Bot API method, repeating rate-limited attempts.
    async fn call<B, T>(&self, method: &str, body: &B) -> TelegramResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            match self.call_once(method, body).await {
                Err(e)
                    if e.code == TelegramErrorCode::RateLimited
                        && attempt < self.config.max_retries =>
                {
                    attempt += 1;
                    let wait = e
                        .retry_after
                        .unwrap_or(1)
                        .min(self.config.max_retry_after_secs);
                    warn!(
                        subsystem = "vendors",
                        component = "telegram",
                        op = method,
                        retry_after_secs = wait,
                        attempt,
                        "Rate limited, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                other => return other,
            }
        }
    }

    async fn call_once<B, T>(&self, method: &str, body: &B) -> TelegramResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        // The token is part of the path; never log the URL.
        let url = format!(
            "{}/bot{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.token,
            method
        );
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status().as_u16();

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            TelegramError::new(
                TelegramErrorCode::from_response(status, &e.to_string()),
                format!("HTTP {}: unreadable response: {}", status, e),
            )
        })?;

        if envelope.ok {
            debug!(subsystem = "vendors", component = "telegram", op = method, "Call succeeded");
            return envelope.result.ok_or_else(|| {
                TelegramError::new(TelegramErrorCode::Unknown, "response carried no result")
            });
        }

        let description = envelope.description.unwrap_or_default();
        let code = TelegramErrorCode::from_response(
            envelope.error_code.unwrap_or(status),
            &description,
        );
        Err(TelegramError {
            code,
            description,
            retry_after: envelope.parameters.and_then(|p| p.retry_after),
        })
    }
}

#[async_trait]
impl TelegramApi for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<Message> {
        self.call("sendMessage", &SendMessageRequest { chat_id, text })
            .await
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> TelegramResult<()> {
        // Result is the edited Message, or `true` for inline messages
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                &EditMessageTextRequest {
                    chat_id,
                    message_id,
                    text,
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TelegramResult<()> {
        let _: bool = self
            .call(
                "deleteMessage",
                &DeleteMessageRequest {
                    chat_id,
                    message_id,
                },
            )
            .await?;
        Ok(())
    }

    async fn set_message_reaction(
        &self,
        chat_id: i64,
        message_id: i64,
        emoji: Option<&str>,
    ) -> TelegramResult<()> {
        let reaction = emoji
            .map(|e| ReactionType::Emoji {
                emoji: e.to_string(),
            })
            .into_iter()
            .collect();
        let _: bool = self
            .call(
                "setMessageReaction",
                &SetMessageReactionRequest {
                    chat_id,
                    message_id,
                    reaction,
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelegramConfig::default();
        assert_eq!(config.base_url, TELEGRAM_API_URL);
        assert_eq!(config.max_retries, TELEGRAM_MAX_RETRIES);
        assert!(config.bot_token.is_none());
    }

    #[test]
    fn test_client_requires_token() {
        let err = TelegramClient::new(TelegramConfig::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_client_creation_with_token() {
        let client = TelegramClient::new(TelegramConfig::default().with_bot_token("123:abc"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = TelegramConfig::default().with_bot_token("123:secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
