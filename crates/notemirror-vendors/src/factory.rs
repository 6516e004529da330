//! Adapter selection for loaded buckets.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use notemirror_core::{
    AdapterFactory, Bucket, BucketAdapter, BucketType, ChatMessageLedger, Error, Integration,
    IntegrationRepository, IntegrationType, Result,
};

use crate::notion::{NotionClient, NotionConfig, NotionDatabaseAdapter};
use crate::telegram::{TelegramChatAdapter, TelegramClient, TelegramConfig};

/// Credential key holding a Telegram bot token.
pub const TELEGRAM_TOKEN_KEY: &str = "bot_token";

/// Credential key holding a Notion integration secret.
pub const NOTION_SECRET_KEY: &str = "secret";

/// Builds the adapter for a bucket from its integration credentials.
///
/// Integration credentials take precedence over the tokens in the vendor
/// configs, which act as process-wide fallbacks.
pub struct VendorAdapterFactory {
    integrations: Arc<dyn IntegrationRepository>,
    ledger: Arc<dyn ChatMessageLedger>,
    telegram: TelegramConfig,
    notion: NotionConfig,
}

impl VendorAdapterFactory {
    pub fn new(
        integrations: Arc<dyn IntegrationRepository>,
        ledger: Arc<dyn ChatMessageLedger>,
    ) -> Self {
        Self {
            integrations,
            ledger,
            telegram: TelegramConfig::default(),
            notion: NotionConfig::default(),
        }
    }

    /// Vendor configs read from the environment.
    pub fn from_env(
        integrations: Arc<dyn IntegrationRepository>,
        ledger: Arc<dyn ChatMessageLedger>,
    ) -> Self {
        Self::new(integrations, ledger)
            .with_telegram_config(TelegramConfig::from_env())
            .with_notion_config(NotionConfig::from_env())
    }

    pub fn with_telegram_config(mut self, config: TelegramConfig) -> Self {
        self.telegram = config;
        self
    }

    pub fn with_notion_config(mut self, config: NotionConfig) -> Self {
        self.notion = config;
        self
    }

    async fn integration(&self, bucket: &Bucket) -> Result<Option<Integration>> {
        let Some(integration_id) = bucket.integration_id else {
            return Ok(None);
        };
        let integration = self
            .integrations
            .get_integration_by_id(bucket.user_id, integration_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("integration {}", integration_id)))?;

        let expected = match bucket.bucket_type {
            BucketType::TelegramChat => IntegrationType::Telegram,
            BucketType::NotionDatabase => IntegrationType::Notion,
        };
        if integration.integration_type != expected {
            return Err(Error::UnsupportedAction(format!(
                "{} bucket {} cannot use a {} integration",
                bucket.bucket_type,
                bucket.id,
                integration.integration_type.as_str()
            )));
        }
        Ok(Some(integration))
    }

    /// Chat adapter for a Telegram bucket, for callers that need its
    /// chat-specific operations (ingesting messages, reactions).
    pub async fn telegram_adapter(&self, bucket: &Bucket) -> Result<TelegramChatAdapter> {
        if bucket.bucket_type != BucketType::TelegramChat {
            return Err(Error::UnsupportedAction(format!(
                "bucket {} is not a Telegram chat",
                bucket.id
            )));
        }
        let mut config = self.telegram.clone();
        if let Some(integration) = self.integration(bucket).await? {
            if let Ok(token) = integration.credential(TELEGRAM_TOKEN_KEY) {
                config = config.with_bot_token(token);
            }
        }
        let client = TelegramClient::new(config)?;
        Ok(TelegramChatAdapter::new(Arc::new(client), self.ledger.clone()))
    }

    pub async fn notion_adapter(&self, bucket: &Bucket) -> Result<NotionDatabaseAdapter> {
        if bucket.bucket_type != BucketType::NotionDatabase {
            return Err(Error::UnsupportedAction(format!(
                "bucket {} is not a Notion database",
                bucket.id
            )));
        }
        let mut config = self.notion.clone();
        if let Some(integration) = self.integration(bucket).await? {
            if let Ok(secret) = integration.credential(NOTION_SECRET_KEY) {
                config = config.with_api_key(secret);
            }
        }
        let schema = config.schema.clone();
        let client = NotionClient::new(config)?;
        Ok(NotionDatabaseAdapter::new(Arc::new(client), schema))
    }
}

#[async_trait]
impl AdapterFactory for VendorAdapterFactory {
    async fn adapter_for(&self, bucket: &Bucket) -> Result<Arc<dyn BucketAdapter>> {
        debug!(
            subsystem = "vendors",
            component = "factory",
            op = "adapter_for",
            bucket_id = %bucket.id,
            bucket_type = %bucket.bucket_type,
            "Selecting adapter"
        );
        let adapter: Arc<dyn BucketAdapter> = match bucket.bucket_type {
            BucketType::TelegramChat => Arc::new(self.telegram_adapter(bucket).await?),
            BucketType::NotionDatabase => Arc::new(self.notion_adapter(bucket).await?),
        };
        Ok(adapter)
    }
}
