//! Core data models for notemirror.
//!
//! These types are shared across all notemirror crates and represent
//! the core domain entities.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// NOTE TYPES
// =============================================================================

/// Workflow status carried by a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
    /// Terminal: the note and its mirror are purged on the next pass.
    ToDelete,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::NotStarted => "not_started",
            NoteStatus::InProgress => "in_progress",
            NoteStatus::Done => "done",
            NoteStatus::ToDelete => "to_delete",
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "not_started" => Ok(NoteStatus::NotStarted),
            "in_progress" => Ok(NoteStatus::InProgress),
            "done" => Ok(NoteStatus::Done),
            "to_delete" => Ok(NoteStatus::ToDelete),
            other => Err(Error::InvalidResource(format!("unknown note status '{}'", other))),
        }
    }
}

/// Which kind of backend record a vendor entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorEntityType {
    ChatMessage,
    StructuredPage,
}

impl VendorEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VendorEntityType::ChatMessage => "chat_message",
            VendorEntityType::StructuredPage => "structured_page",
        }
    }
}

impl fmt::Display for VendorEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-specific coordinates of a vendor entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VendorEntityMetadata {
    ChatMessage { chat_id: i64, message_id: i64 },
    StructuredPage { database_id: String, page_id: String },
}

/// A note's representation inside one backend.
///
/// Never mutated in place: adapters return a fresh entity after every
/// successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorEntity {
    pub id: String,
    pub vendor_entity_type: VendorEntityType,
    /// MD5 of the normalized note content (see [`crate::vendor_entity::hash`]).
    pub hash: String,
    pub metadata: VendorEntityMetadata,
}

/// Minimal key used to look up a vendor entity without fetching content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VendorEntityQuery {
    pub id: String,
    pub vendor_entity_type: VendorEntityType,
}

/// The logical unit being mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Note {
    pub content: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_vendor_entity: Option<VendorEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_vendor_entity: Option<VendorEntity>,
    #[serde(default)]
    pub status: NoteStatus,
}

impl Note {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_status(mut self, status: NoteStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_source(mut self, entity: VendorEntity) -> Self {
        self.source_vendor_entity = Some(entity);
        self
    }

    pub fn with_mirror(mut self, entity: VendorEntity) -> Self {
        self.mirror_vendor_entity = Some(entity);
        self
    }
}

// =============================================================================
// BUCKET TYPES
// =============================================================================

/// Backend kind of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketType {
    /// Chat-like message stream (Telegram chat).
    TelegramChat,
    /// Structured record store (Notion database).
    NotionDatabase,
}

impl BucketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketType::TelegramChat => "telegram_chat",
            BucketType::NotionDatabase => "notion_database",
        }
    }

    /// Entity type owned by adapters of this bucket type.
    pub fn vendor_entity_type(&self) -> VendorEntityType {
        match self {
            BucketType::TelegramChat => VendorEntityType::ChatMessage,
            BucketType::NotionDatabase => VendorEntityType::StructuredPage,
        }
    }
}

impl fmt::Display for BucketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BucketType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram_chat" => Ok(BucketType::TelegramChat),
            "notion_database" => Ok(BucketType::NotionDatabase),
            other => Err(Error::UnsupportedAction(format!(
                "unknown bucket type '{}'",
                other
            ))),
        }
    }
}

/// One backend-specific note container belonging to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Backend-native identifier (chat id, database id).
    pub query_id: String,
    pub bucket_type: BucketType,
    pub metadata: JsonValue,
    pub integration_id: Option<Uuid>,
    pub created_at_utc: DateTime<Utc>,
}

/// Request for creating (or re-using) a bucket.
#[derive(Debug, Clone)]
pub struct CreateBucketRequest {
    pub user_id: Uuid,
    pub query_id: String,
    pub bucket_type: BucketType,
    pub metadata: Option<JsonValue>,
    pub integration_id: Option<Uuid>,
}

// =============================================================================
// LINK TYPES
// =============================================================================

/// Per-link evaluation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Suppress lower-priority links once this one matches.
    #[serde(default)]
    pub stop_on_match: bool,
}

/// Directed, prioritized routing rule from a source bucket to a mirror bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_bucket_id: Uuid,
    pub mirror_bucket_id: Uuid,
    /// Higher is evaluated first.
    pub priority: i32,
    pub template: Option<String>,
    #[serde(default)]
    pub default_tags: Vec<String>,
    #[serde(default)]
    pub settings: LinkSettings,
    pub created_at_utc: DateTime<Utc>,
}

/// Request for creating a link.
#[derive(Debug, Clone)]
pub struct CreateLinkRequest {
    pub user_id: Uuid,
    pub source_bucket_id: Uuid,
    pub mirror_bucket_id: Uuid,
    pub priority: i32,
    pub template: Option<String>,
    pub default_tags: Vec<String>,
    pub settings: LinkSettings,
}

// =============================================================================
// INTEGRATION TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    Notion,
    Telegram,
}

impl IntegrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationType::Notion => "notion",
            IntegrationType::Telegram => "telegram",
        }
    }
}

impl FromStr for IntegrationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notion" => Ok(IntegrationType::Notion),
            "telegram" => Ok(IntegrationType::Telegram),
            other => Err(Error::UnsupportedAction(format!(
                "unknown integration type '{}'",
                other
            ))),
        }
    }
}

/// Credential container for one external account.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: Uuid,
    pub user_id: Uuid,
    pub integration_type: IntegrationType,
    pub credentials: JsonValue,
    pub created_at_utc: DateTime<Utc>,
}

impl fmt::Debug for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Integration")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("integration_type", &self.integration_type)
            .field("credentials", &"<redacted>")
            .field("created_at_utc", &self.created_at_utc)
            .finish()
    }
}

impl Integration {
    /// Read a string credential, failing with `InvalidResource` when absent.
    pub fn credential(&self, key: &str) -> crate::Result<&str> {
        self.credentials
            .get(key)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                Error::InvalidResource(format!(
                    "integration {} is missing credential '{}'",
                    self.id, key
                ))
            })
    }
}

/// Request for storing an integration.
#[derive(Debug, Clone)]
pub struct CreateIntegrationRequest {
    pub user_id: Uuid,
    pub integration_type: IntegrationType,
    pub credentials: JsonValue,
}

// =============================================================================
// CHAT LEDGER TYPES
// =============================================================================

/// One known message of a chat bucket.
///
/// Chat backends can neither be scanned nor annotated, so the chat adapter
/// keeps this side-table as its view of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    pub bucket_id: Uuid,
    pub chat_id: i64,
    pub message_id: i64,
    pub content: String,
    pub tags: Vec<String>,
    pub hash: String,
    pub status: NoteStatus,
    pub mirror_vendor_entity: Option<VendorEntity>,
    pub updated_at_utc: DateTime<Utc>,
}

// =============================================================================
// SYNC REPORTING
// =============================================================================

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub detached: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    /// Number of notes that caused a write somewhere.
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.detached + self.deleted
    }
}

impl std::ops::AddAssign for SyncReport {
    fn add_assign(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.detached += other.detached;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}
