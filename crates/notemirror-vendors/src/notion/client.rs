//! Notion REST API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use notemirror_core::defaults::{
    NOTION_API_URL, NOTION_PAGE_SIZE, NOTION_PROP_CONTENT, NOTION_PROP_MIRROR, NOTION_PROP_STATUS,
    NOTION_PROP_TAGS, NOTION_PROP_VENDOR_ENTITIES, NOTION_TIMEOUT_SECS, NOTION_VERSION,
};
use notemirror_core::{Error, Result};

use super::error::{to_notemirror_error, NotionErrorCode};
use super::types::*;

/// Names of the database properties a note is stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotionSchema {
    /// Title property holding the note content.
    pub content: String,
    /// Multi-select property holding tags.
    pub tags: String,
    /// Select property holding the status.
    pub status: String,
    /// Rich-text property holding the mirror entity id (filterable).
    pub mirror: String,
    /// Rich-text property holding the encoded vendor entity list.
    pub vendor_entities: String,
}

impl Default for NotionSchema {
    fn default() -> Self {
        Self {
            content: NOTION_PROP_CONTENT.to_string(),
            tags: NOTION_PROP_TAGS.to_string(),
            status: NOTION_PROP_STATUS.to_string(),
            mirror: NOTION_PROP_MIRROR.to_string(),
            vendor_entities: NOTION_PROP_VENDOR_ENTITIES.to_string(),
        }
    }
}

impl NotionSchema {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |key: &str, fallback: String| std::env::var(key).unwrap_or(fallback);
        Self {
            content: var("NOTION_PROPERTY_CONTENT", defaults.content),
            tags: var("NOTION_PROPERTY_TAGS", defaults.tags),
            status: var("NOTION_PROPERTY_STATUS", defaults.status),
            mirror: var("NOTION_PROPERTY_MIRROR", defaults.mirror),
            vendor_entities: var("NOTION_PROPERTY_VENDOR_ENTITIES", defaults.vendor_entities),
        }
    }
}

/// Configuration for the Notion client.
#[derive(Clone)]
pub struct NotionConfig {
    pub base_url: String,
    /// Value of the `Notion-Version` header.
    pub version: String,
    /// Fallback integration secret when the integration carries none.
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub schema: NotionSchema,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            base_url: NOTION_API_URL.to_string(),
            version: NOTION_VERSION.to_string(),
            api_key: None,
            timeout_seconds: NOTION_TIMEOUT_SECS,
            schema: NotionSchema::default(),
        }
    }
}

impl std::fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionConfig")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_seconds", &self.timeout_seconds)
            .field("schema", &self.schema)
            .finish()
    }
}

impl NotionConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("NOTION_API_URL").unwrap_or(defaults.base_url),
            version: std::env::var("NOTION_VERSION").unwrap_or(defaults.version),
            api_key: std::env::var("NOTION_API_KEY").ok(),
            timeout_seconds: std::env::var("NOTION_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
            schema: NotionSchema::from_env(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_schema(mut self, schema: NotionSchema) -> Self {
        self.schema = schema;
        self
    }
}

/// The Notion calls the database adapter needs.
#[async_trait]
pub trait NotionApi: Send + Sync {
    /// One page of query results, optionally filtered.
    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<Value>,
        start_cursor: Option<String>,
    ) -> Result<PageList>;

    /// `None` when the page does not exist or is not shared.
    async fn retrieve_page(&self, page_id: &str) -> Result<Option<Page>>;

    async fn create_page(&self, database_id: &str, properties: &Properties) -> Result<Page>;

    async fn update_page(&self, page_id: &str, properties: &Properties) -> Result<Page>;

    /// Archive a page. Missing pages are not an error.
    async fn archive_page(&self, page_id: &str) -> Result<()>;
}

/// reqwest-backed Notion client.
pub struct NotionClient {
    client: Client,
    config: NotionConfig,
    api_key: String,
}

impl NotionClient {
    /// Create a new client. The config must carry an integration secret.
    pub fn new(config: NotionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("Notion API key is not configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn config(&self) -> &NotionConfig {
        &self.config
    }

    fn request(&self, method: reqwest::Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.config.version)
    }

    async fn send<T: DeserializeOwned>(&self, op: &str, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(subsystem = "vendors", component = "notion", op, "Call succeeded");
            return Ok(response.json().await?);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            code: String::new(),
            message: status.to_string(),
        });
        let code = NotionErrorCode::from_response(status.as_u16(), &body.code);
        Err(to_notemirror_error(code, &body.message, retry_after))
    }
}

#[async_trait]
impl NotionApi for NotionClient {
    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<Value>,
        start_cursor: Option<String>,
    ) -> Result<PageList> {
        let body = QueryDatabaseRequest {
            filter,
            start_cursor,
            page_size: NOTION_PAGE_SIZE,
        };
        let request = self
            .request(
                reqwest::Method::POST,
                &format!("/databases/{}/query", database_id),
            )
            .json(&body);
        self.send("query_database", request).await
    }

    async fn retrieve_page(&self, page_id: &str) -> Result<Option<Page>> {
        let request = self.request(reqwest::Method::GET, &format!("/pages/{}", page_id));
        match self.send("retrieve_page", request).await {
            Ok(page) => Ok(Some(page)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_page(&self, database_id: &str, properties: &Properties) -> Result<Page> {
        let body = CreatePageRequest {
            parent: DatabaseParent { database_id },
            properties,
        };
        let request = self.request(reqwest::Method::POST, "/pages").json(&body);
        self.send("create_page", request).await
    }

    async fn update_page(&self, page_id: &str, properties: &Properties) -> Result<Page> {
        let body = UpdatePageRequest {
            properties: Some(properties),
            ..Default::default()
        };
        let request = self
            .request(reqwest::Method::PATCH, &format!("/pages/{}", page_id))
            .json(&body);
        self.send("update_page", request).await
    }

    async fn archive_page(&self, page_id: &str) -> Result<()> {
        let body = UpdatePageRequest {
            archived: Some(true),
            ..Default::default()
        };
        let request = self
            .request(reqwest::Method::PATCH, &format!("/pages/{}", page_id))
            .json(&body);
        match self.send::<Value>("archive_page", request).await {
            Ok(_) | Err(Error::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema() {
        let schema = NotionSchema::default();
        assert_eq!(schema.content, "Name");
        assert_eq!(schema.vendor_entities, "Vendor Entities");
    }

    #[test]
    fn test_client_requires_api_key() {
        let err = NotionClient::new(NotionConfig::default()).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = NotionConfig::default().with_api_key("secret_xyz");
        assert!(!format!("{:?}", config).contains("secret_xyz"));
    }
}
