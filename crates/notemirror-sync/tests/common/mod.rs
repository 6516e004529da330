//! Shared fixtures for orchestrator tests: in-memory storage and a harness
//! wiring mock Telegram and Notion backends into an orchestrator.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use notemirror_sync::{
    Bucket, BucketAdapter, BucketRepository, BucketType, CreateBucketRequest, CreateLinkRequest,
    Error, Link, LinkRepository, LinkSettings, Note, Result, SyncConfig, SyncDeps,
    SyncOrchestrator,
};
use notemirror_vendors::mock::{
    MemoryChatLedger, MockAdapterFactory, MockNotionApi, MockTelegramApi,
};
use notemirror_vendors::notion::{NotionDatabaseAdapter, NotionSchema};
use notemirror_vendors::telegram::TelegramChatAdapter;

#[derive(Default)]
struct StorageState {
    buckets: Vec<Bucket>,
    links: Vec<Link>,
}

/// In-memory bucket and link repositories.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<StorageState>>,
}

#[async_trait]
impl BucketRepository for MemoryStorage {
    async fn get_bucket_by_id(&self, user_id: Uuid, bucket_id: Uuid) -> Result<Option<Bucket>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .buckets
            .iter()
            .find(|b| b.user_id == user_id && b.id == bucket_id)
            .cloned())
    }

    async fn get_bucket_by_query_id(
        &self,
        user_id: Uuid,
        query_id: &str,
    ) -> Result<Option<Bucket>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .buckets
            .iter()
            .find(|b| b.user_id == user_id && b.query_id == query_id)
            .cloned())
    }

    async fn create_bucket(&self, req: CreateBucketRequest) -> Result<Bucket> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .buckets
            .iter()
            .find(|b| b.user_id == req.user_id && b.query_id == req.query_id)
        {
            return Ok(existing.clone());
        }
        let bucket = Bucket {
            id: Uuid::now_v7(),
            user_id: req.user_id,
            query_id: req.query_id,
            bucket_type: req.bucket_type,
            metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
            integration_id: req.integration_id,
            created_at_utc: Utc::now(),
        };
        state.buckets.push(bucket.clone());
        Ok(bucket)
    }

    async fn delete_bucket_by_id(&self, user_id: Uuid, bucket_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.buckets.len();
        state
            .buckets
            .retain(|b| !(b.user_id == user_id && b.id == bucket_id));
        state
            .links
            .retain(|l| l.source_bucket_id != bucket_id && l.mirror_bucket_id != bucket_id);
        Ok(state.buckets.len() < before)
    }
}

#[async_trait]
impl LinkRepository for MemoryStorage {
    async fn get_links_by_mirror_bucket_id(
        &self,
        user_id: Uuid,
        mirror_bucket_id: Uuid,
    ) -> Result<Vec<Link>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .links
            .iter()
            .filter(|l| l.user_id == user_id && l.mirror_bucket_id == mirror_bucket_id)
            .cloned()
            .collect())
    }

    async fn get_linked_source_buckets(
        &self,
        user_id: Uuid,
        mirror_bucket_id: Uuid,
    ) -> Result<Vec<Bucket>> {
        let state = self.state.lock().unwrap();
        let mut sources: Vec<Bucket> = Vec::new();
        for link in state
            .links
            .iter()
            .filter(|l| l.user_id == user_id && l.mirror_bucket_id == mirror_bucket_id)
        {
            if sources.iter().any(|b| b.id == link.source_bucket_id) {
                continue;
            }
            if let Some(bucket) = state.buckets.iter().find(|b| b.id == link.source_bucket_id) {
                sources.push(bucket.clone());
            }
        }
        Ok(sources)
    }

    async fn create_link(&self, req: CreateLinkRequest) -> Result<Link> {
        let mut state = self.state.lock().unwrap();
        let duplicate = state.links.iter().any(|l| {
            l.user_id == req.user_id
                && l.source_bucket_id == req.source_bucket_id
                && l.mirror_bucket_id == req.mirror_bucket_id
                && l.template == req.template
        });
        if duplicate {
            return Err(Error::InvalidResource("duplicate link".into()));
        }
        let link = Link {
            id: Uuid::now_v7(),
            user_id: req.user_id,
            source_bucket_id: req.source_bucket_id,
            mirror_bucket_id: req.mirror_bucket_id,
            priority: req.priority,
            template: req.template,
            default_tags: req.default_tags,
            settings: req.settings,
            created_at_utc: Utc::now(),
        };
        state.links.push(link.clone());
        Ok(link)
    }

    async fn delete_link_by_id(&self, user_id: Uuid, link_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.links.len();
        state
            .links
            .retain(|l| !(l.user_id == user_id && l.id == link_id));
        Ok(state.links.len() < before)
    }
}

/// Link options for [`Harness::link`].
#[derive(Debug, Clone, Default)]
pub struct LinkSpec<'a> {
    pub priority: i32,
    pub template: Option<&'a str>,
    pub default_tags: &'a [&'a str],
    pub stop_on_match: bool,
}

/// One user's buckets on mock backends, synced by a real orchestrator.
pub struct Harness {
    pub user_id: Uuid,
    pub storage: MemoryStorage,
    pub telegram: MockTelegramApi,
    pub notion: MockNotionApi,
    pub ledger: MemoryChatLedger,
    pub chat: Arc<TelegramChatAdapter>,
    pub pages: Arc<NotionDatabaseAdapter>,
    pub orchestrator: SyncOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default().with_reaction_clear_delay_ms(0))
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self::with_backends(MockTelegramApi::new(), MockNotionApi::new(), config)
    }

    pub fn with_backends(
        telegram: MockTelegramApi,
        notion: MockNotionApi,
        config: SyncConfig,
    ) -> Self {
        let storage = MemoryStorage::default();
        let ledger = MemoryChatLedger::new();
        let chat = Arc::new(TelegramChatAdapter::new(
            Arc::new(telegram.clone()),
            Arc::new(ledger.clone()),
        ));
        let pages = Arc::new(NotionDatabaseAdapter::new(
            Arc::new(notion.clone()),
            NotionSchema::default(),
        ));
        let factory = MockAdapterFactory::new()
            .with_adapter(BucketType::TelegramChat, chat.clone() as Arc<dyn BucketAdapter>)
            .with_adapter(BucketType::NotionDatabase, pages.clone() as Arc<dyn BucketAdapter>);
        let deps = SyncDeps::new(
            Arc::new(storage.clone()),
            Arc::new(storage.clone()),
            Arc::new(factory),
        );
        Self {
            user_id: Uuid::now_v7(),
            storage,
            telegram,
            notion,
            ledger,
            chat,
            pages,
            orchestrator: SyncOrchestrator::new(deps, config),
        }
    }

    async fn bucket(&self, query_id: String, bucket_type: BucketType) -> Bucket {
        self.storage
            .create_bucket(CreateBucketRequest {
                user_id: self.user_id,
                query_id,
                bucket_type,
                metadata: None,
                integration_id: None,
            })
            .await
            .expect("create bucket")
    }

    pub async fn notion_bucket(&self, database_id: &str) -> Bucket {
        self.bucket(database_id.to_string(), BucketType::NotionDatabase)
            .await
    }

    pub async fn chat_bucket(&self, chat_id: i64) -> Bucket {
        self.bucket(chat_id.to_string(), BucketType::TelegramChat).await
    }

    pub async fn link(&self, source: &Bucket, mirror: &Bucket, spec: LinkSpec<'_>) -> Link {
        self.storage
            .create_link(CreateLinkRequest {
                user_id: self.user_id,
                source_bucket_id: source.id,
                mirror_bucket_id: mirror.id,
                priority: spec.priority,
                template: spec.template.map(String::from),
                default_tags: spec.default_tags.iter().map(|t| t.to_string()).collect(),
                settings: LinkSettings {
                    stop_on_match: spec.stop_on_match,
                },
            })
            .await
            .expect("create link")
    }

    /// Notes of a Notion bucket as the adapter reads them.
    pub async fn page_notes(&self, bucket: &Bucket) -> Vec<Note> {
        self.pages.read_all(bucket).await.expect("read pages")
    }

    /// Notes of a chat bucket as the adapter reads them.
    pub async fn chat_notes(&self, bucket: &Bucket) -> Vec<Note> {
        self.chat.read_all(bucket).await.expect("read chat")
    }

    /// Vendor calls that changed something, across both backends.
    pub fn write_count(&self) -> usize {
        self.telegram.write_count() + self.notion.write_count()
    }

    pub fn clear_calls(&self) {
        self.telegram.clear_calls();
        self.notion.clear_calls();
    }
}

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
