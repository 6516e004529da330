//! Core traits for notemirror abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// STORAGE GATEWAY TRAITS
// =============================================================================

/// Repository for bucket persistence. Every call is scoped by `user_id`.
#[async_trait]
pub trait BucketRepository: Send + Sync {
    /// Fetch a bucket by its id.
    async fn get_bucket_by_id(&self, user_id: Uuid, bucket_id: Uuid) -> Result<Option<Bucket>>;

    /// Fetch a bucket by its backend-native id (chat id, database id).
    async fn get_bucket_by_query_id(&self, user_id: Uuid, query_id: &str)
        -> Result<Option<Bucket>>;

    /// Create a bucket, or return the existing one for `(user_id, query_id)`.
    async fn create_bucket(&self, req: CreateBucketRequest) -> Result<Bucket>;

    /// Delete a bucket. Returns whether a row was removed.
    async fn delete_bucket_by_id(&self, user_id: Uuid, bucket_id: Uuid) -> Result<bool>;
}

/// Repository for link persistence. Every call is scoped by `user_id`.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// All links whose mirror is `mirror_bucket_id`, in insertion order.
    async fn get_links_by_mirror_bucket_id(
        &self,
        user_id: Uuid,
        mirror_bucket_id: Uuid,
    ) -> Result<Vec<Link>>;

    /// Distinct source buckets linked to `mirror_bucket_id`.
    async fn get_linked_source_buckets(
        &self,
        user_id: Uuid,
        mirror_bucket_id: Uuid,
    ) -> Result<Vec<Bucket>>;

    /// Create a link. `(user, source, mirror, template)` must be unique.
    async fn create_link(&self, req: CreateLinkRequest) -> Result<Link>;

    /// Delete a link. Returns whether a row was removed.
    async fn delete_link_by_id(&self, user_id: Uuid, link_id: Uuid) -> Result<bool>;
}

/// Repository for integration credentials.
#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn get_integration_by_id(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
    ) -> Result<Option<Integration>>;

    async fn create_integration(&self, req: CreateIntegrationRequest) -> Result<Integration>;
}

/// Side-table of known chat messages, owned by the chat adapter.
#[async_trait]
pub trait ChatMessageLedger: Send + Sync {
    async fn get(&self, bucket_id: Uuid, message_id: i64) -> Result<Option<ChatMessageRecord>>;

    /// All live messages of a bucket, oldest first.
    async fn list(&self, bucket_id: Uuid) -> Result<Vec<ChatMessageRecord>>;

    /// Message whose mirror pointer has the given vendor entity id.
    async fn find_by_mirror(
        &self,
        bucket_id: Uuid,
        mirror_id: &str,
    ) -> Result<Option<ChatMessageRecord>>;

    /// Insert or replace the record for `(bucket_id, message_id)`.
    async fn put(&self, record: ChatMessageRecord) -> Result<()>;

    /// Remove a record. Returns whether one existed.
    async fn remove(&self, bucket_id: Uuid, message_id: i64) -> Result<bool>;
}

// =============================================================================
// BUCKET ADAPTER TRAITS
// =============================================================================

/// Per-backend read/write access to the notes of a bucket.
#[async_trait]
pub trait BucketAdapter: Send + Sync {
    /// Entity type this adapter creates.
    fn vendor_entity_type(&self) -> VendorEntityType;

    /// Full scan of the bucket.
    async fn read_all(&self, bucket: &Bucket) -> Result<Vec<Note>>;

    /// Full scan that reports malformed records individually instead of
    /// failing the whole read.
    async fn scan(&self, bucket: &Bucket) -> Result<Vec<Result<Note>>> {
        Ok(self.read_all(bucket).await?.into_iter().map(Ok).collect())
    }

    /// Note whose mirror pointer matches `query`.
    async fn find_by_mirror_query(
        &self,
        bucket: &Bucket,
        query: &VendorEntityQuery,
    ) -> Result<Option<Note>>;

    /// Update in place when the note carries a source entity of this
    /// backend, otherwise create. Returns the note with a fresh source entity.
    async fn upsert(&self, bucket: &Bucket, note: Note) -> Result<Note>;

    /// Remove the backend record. Already-absent records are not an error.
    async fn delete(&self, bucket: &Bucket, note: &Note) -> Result<()>;

    /// Clear the mirror pointer of the record identified by `query`.
    async fn detach(&self, bucket: &Bucket, query: &VendorEntityQuery) -> Result<()>;

    /// Remove reactions from the record identified by `query`.
    async fn clear_reaction(&self, bucket: &Bucket, query: &VendorEntityQuery) -> Result<()> {
        let _ = (bucket, query);
        Err(crate::Error::UnsupportedAction(format!(
            "{} buckets have no reactions",
            self.vendor_entity_type()
        )))
    }
}

/// Chooses the adapter for a bucket once, when the bucket is loaded.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn adapter_for(&self, bucket: &Bucket) -> Result<Arc<dyn BucketAdapter>>;
}

/// A bucket together with the adapter selected for it.
#[derive(Clone)]
pub struct LoadedBucket {
    pub bucket: Bucket,
    pub adapter: Arc<dyn BucketAdapter>,
}

impl LoadedBucket {
    pub fn id(&self) -> Uuid {
        self.bucket.id
    }

    /// Whether `entity` lives in this bucket.
    pub fn holds(&self, entity: &VendorEntity) -> bool {
        entity.vendor_entity_type == self.adapter.vendor_entity_type()
            && entity.bucket_query_id() == self.bucket.query_id
    }
}

impl std::fmt::Debug for LoadedBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedBucket")
            .field("bucket", &self.bucket)
            .field("vendor_entity_type", &self.adapter.vendor_entity_type())
            .finish()
    }
}
