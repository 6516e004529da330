//! Structured-record bucket adapter backed by a Notion database.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use notemirror_core::{
    hash, Bucket, BucketAdapter, Note, Result, VendorEntity, VendorEntityMetadata,
    VendorEntityQuery, VendorEntityType,
};

use super::client::{NotionApi, NotionSchema};
use super::properties::{mirror_properties, note_properties, page_to_note, stored_tags};
use super::types::Page;

/// Bucket adapter for a Notion database. The bucket's `query_id` is the
/// database id.
pub struct NotionDatabaseAdapter {
    api: Arc<dyn NotionApi>,
    schema: NotionSchema,
}

impl NotionDatabaseAdapter {
    pub fn new(api: Arc<dyn NotionApi>, schema: NotionSchema) -> Self {
        Self { api, schema }
    }

    /// Page id of an entity, if it is a page of this bucket's database.
    fn page_id_in<'a>(bucket: &Bucket, entity: &'a VendorEntity) -> Option<&'a str> {
        match &entity.metadata {
            VendorEntityMetadata::StructuredPage {
                database_id,
                page_id,
            } if *database_id == bucket.query_id => Some(page_id.as_str()),
            _ => None,
        }
    }

    /// Live (not archived) pages whose mirror pointer equals `mirror_id`.
    async fn pages_by_mirror(&self, bucket: &Bucket, mirror_id: &str) -> Result<Vec<Page>> {
        let filter = json!({
            "property": self.schema.mirror,
            "rich_text": { "equals": mirror_id }
        });
        let list = self
            .api
            .query_database(&bucket.query_id, Some(filter), None)
            .await?;
        Ok(list.results.into_iter().filter(|p| !p.archived).collect())
    }

    async fn live_page(&self, page_id: &str) -> Result<Option<Page>> {
        Ok(self.api.retrieve_page(page_id).await?.filter(|p| !p.archived))
    }

    async fn clear_mirror(&self, bucket: &Bucket, page: &Page) -> Result<()> {
        let note = page_to_note(&self.schema, &bucket.query_id, page)?;
        if note.mirror_vendor_entity.is_none() {
            return Ok(());
        }
        let properties =
            mirror_properties(&self.schema, note.source_vendor_entity.as_ref(), None)?;
        self.api.update_page(&page.id, &properties).await?;
        debug!(
            subsystem = "vendors",
            component = "notion",
            op = "detach",
            page_id = %page.id,
            "Mirror pointer cleared"
        );
        Ok(())
    }
}

/// Whether writing `note` over `current` would change anything visible.
fn differs(current: &Note, note: &Note) -> bool {
    hash(&current.content) != hash(&note.content)
        || stored_tags(&current.tags) != stored_tags(&note.tags)
        || current.status != note.status
        || current.mirror_vendor_entity != note.mirror_vendor_entity
}

#[async_trait]
impl BucketAdapter for NotionDatabaseAdapter {
    fn vendor_entity_type(&self) -> VendorEntityType {
        VendorEntityType::StructuredPage
    }

    async fn read_all(&self, bucket: &Bucket) -> Result<Vec<Note>> {
        self.scan(bucket).await?.into_iter().collect()
    }

    async fn scan(&self, bucket: &Bucket) -> Result<Vec<Result<Note>>> {
        let mut notes = Vec::new();
        let mut cursor = None;
        loop {
            let list = self
                .api
                .query_database(&bucket.query_id, None, cursor)
                .await?;
            notes.extend(
                list.results
                    .iter()
                    .filter(|page| !page.archived)
                    .map(|page| page_to_note(&self.schema, &bucket.query_id, page)),
            );
            match list.next_cursor {
                Some(next) if list.has_more => cursor = Some(next),
                _ => break,
            }
        }
        debug!(
            subsystem = "vendors",
            component = "notion",
            op = "scan",
            database_id = %bucket.query_id,
            note_count = notes.len(),
            "Database scanned"
        );
        Ok(notes)
    }

    async fn find_by_mirror_query(
        &self,
        bucket: &Bucket,
        query: &VendorEntityQuery,
    ) -> Result<Option<Note>> {
        let pages = self.pages_by_mirror(bucket, &query.id).await?;
        if pages.len() > 1 {
            warn!(
                subsystem = "vendors",
                component = "notion",
                op = "find_by_mirror_query",
                vendor_entity_id = %query.id,
                page_count = pages.len(),
                "Several pages share a mirror pointer, using the first"
            );
        }
        pages
            .first()
            .map(|page| page_to_note(&self.schema, &bucket.query_id, page))
            .transpose()
    }

    async fn upsert(&self, bucket: &Bucket, note: Note) -> Result<Note> {
        let page_id = note
            .source_vendor_entity
            .as_ref()
            .and_then(|e| Self::page_id_in(bucket, e))
            .map(str::to_string);

        let existing = match &page_id {
            Some(id) => self.live_page(id).await?,
            None => None,
        };

        let page = match existing {
            Some(page) => {
                let current = page_to_note(&self.schema, &bucket.query_id, &page)?;
                if !differs(&current, &note) {
                    debug!(
                        subsystem = "vendors",
                        component = "notion",
                        op = "upsert",
                        page_id = %page.id,
                        "Page unchanged, skipping update"
                    );
                    return Ok(Note {
                        source_vendor_entity: current.source_vendor_entity,
                        ..note
                    });
                }
                let properties = note_properties(&self.schema, &note)?;
                self.api.update_page(&page.id, &properties).await?
            }
            None => {
                // Written without a page entity; the id is only known afterwards
                let fresh = Note {
                    source_vendor_entity: None,
                    ..note.clone()
                };
                let properties = note_properties(&self.schema, &fresh)?;
                let created = self.api.create_page(&bucket.query_id, &properties).await?;
                debug!(
                    subsystem = "vendors",
                    component = "notion",
                    op = "upsert",
                    page_id = %created.id,
                    "Page created"
                );
                created
            }
        };

        let entity =
            VendorEntity::structured_page(bucket.query_id.clone(), page.id, hash(&note.content));
        Ok(Note {
            source_vendor_entity: Some(entity),
            ..note
        })
    }

    async fn delete(&self, bucket: &Bucket, note: &Note) -> Result<()> {
        let Some(page_id) = note
            .source_vendor_entity
            .as_ref()
            .and_then(|e| Self::page_id_in(bucket, e))
        else {
            return Ok(());
        };
        self.api.archive_page(page_id).await
    }

    async fn detach(&self, bucket: &Bucket, query: &VendorEntityQuery) -> Result<()> {
        let pages = match query.vendor_entity_type {
            VendorEntityType::StructuredPage => {
                self.live_page(&query.id).await?.into_iter().collect()
            }
            // A foreign query names the mirror, not the page
            _ => self.pages_by_mirror(bucket, &query.id).await?,
        };
        for page in &pages {
            self.clear_mirror(bucket, page).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockNotionApi, NotionCall};
    use crate::notion::Properties;
    use chrono::Utc;
    use notemirror_core::{BucketType, Error, NoteStatus};
    use uuid::Uuid;

    fn notion_bucket() -> Bucket {
        Bucket {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            query_id: "db-1".to_string(),
            bucket_type: BucketType::NotionDatabase,
            metadata: json!({}),
            integration_id: None,
            created_at_utc: Utc::now(),
        }
    }

    fn setup(api: MockNotionApi) -> (NotionDatabaseAdapter, MockNotionApi) {
        let adapter = NotionDatabaseAdapter::new(Arc::new(api.clone()), NotionSchema::default());
        (adapter, api)
    }

    #[test]
    fn test_differs_ignores_source_entity() {
        let a = Note::new("x").with_source(VendorEntity::structured_page("db", "p1", "h1"));
        let b = Note::new("x").with_source(VendorEntity::structured_page("db", "p2", "h2"));
        assert!(!differs(&a, &b));
    }

    #[test]
    fn test_differs_on_status_and_mirror() {
        let a = Note::new("x");
        assert!(differs(&a, &Note::new("x").with_status(NoteStatus::Done)));
        assert!(differs(
            &a,
            &Note::new("x").with_mirror(VendorEntity::chat_message(1, 2, "h"))
        ));
    }

    #[test]
    fn test_differs_uses_normalized_content() {
        assert!(!differs(&Note::new("x\r\n"), &Note::new("x")));
    }

    #[tokio::test]
    async fn test_scan_paginates_and_skips_archived() {
        let (adapter, api) = setup(MockNotionApi::new().with_page_size(2));
        let bucket = notion_bucket();
        for i in 0..5 {
            api.seed_note("db-1", &Note::new(format!("note {}", i)));
        }
        api.seed_note("db-2", &Note::new("elsewhere"));
        let archived = api.seed_note("db-1", &Note::new("gone"));
        api.archive_page(&archived).await.unwrap();
        api.clear_calls();

        let notes = adapter.read_all(&bucket).await.unwrap();
        assert_eq!(notes.len(), 5);
        let queries = api
            .calls()
            .iter()
            .filter(|c| matches!(c, NotionCall::Query { .. }))
            .count();
        assert_eq!(queries, 3);
    }

    #[tokio::test]
    async fn test_scan_reports_malformed_pages_individually() {
        let (adapter, api) = setup(MockNotionApi::new());
        let bucket = notion_bucket();
        api.seed_note("db-1", &Note::new("fine"));
        let mut untitled = Properties::new();
        untitled.insert("Tags".into(), json!({"multi_select": []}));
        api.seed_raw("db-1", untitled);

        let entries = adapter.scan(&bucket).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_ok());
        assert!(matches!(entries[1], Err(Error::InvalidResource(_))));

        assert!(adapter.read_all(&bucket).await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_creates_then_skips_unchanged() {
        let (adapter, api) = setup(MockNotionApi::new());
        let bucket = notion_bucket();
        let mirror = VendorEntity::chat_message(-100, 7, hash("Buy milk #errand"));

        let note = Note::new("Buy milk #errand")
            .with_tags(["errand", "synced"])
            .with_mirror(mirror.clone());
        let stored = adapter.upsert(&bucket, note).await.unwrap();
        let entity = stored.source_vendor_entity.clone().unwrap();
        assert_eq!(entity.hash, hash("Buy milk #errand"));
        assert_eq!(entity.bucket_query_id(), "db-1");
        assert_eq!(api.write_count(), 1);

        api.clear_calls();
        let again = adapter.upsert(&bucket, stored).await.unwrap();
        assert_eq!(api.write_count(), 0);
        assert_eq!(again.source_vendor_entity, Some(entity.clone()));

        let found = adapter
            .find_by_mirror_query(&bucket, &mirror.query())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.source_vendor_entity.unwrap().id, entity.id);
        assert_eq!(found.mirror_vendor_entity, Some(mirror));
    }

    #[tokio::test]
    async fn test_upsert_updates_changed_status_in_place() {
        let (adapter, api) = setup(MockNotionApi::new());
        let bucket = notion_bucket();

        let stored = adapter.upsert(&bucket, Note::new("Buy milk")).await.unwrap();
        let page_id = stored.source_vendor_entity.clone().unwrap().id;
        api.clear_calls();

        let done = stored.with_status(NoteStatus::Done);
        let updated = adapter.upsert(&bucket, done).await.unwrap();

        assert_eq!(updated.source_vendor_entity.unwrap().id, page_id);
        assert_eq!(
            api.calls()
                .iter()
                .filter(|c| matches!(c, NotionCall::Update { .. }))
                .count(),
            1
        );
        let notes = adapter.read_all(&bucket).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].status, NoteStatus::Done);
    }

    #[tokio::test]
    async fn test_upsert_of_archived_page_recreates() {
        let (adapter, api) = setup(MockNotionApi::new());
        let bucket = notion_bucket();

        let stored = adapter.upsert(&bucket, Note::new("Buy milk")).await.unwrap();
        let old_id = stored.source_vendor_entity.clone().unwrap().id;
        api.archive_page(&old_id).await.unwrap();

        let again = adapter.upsert(&bucket, stored).await.unwrap();
        assert_ne!(again.source_vendor_entity.unwrap().id, old_id);
        assert_eq!(api.pages("db-1").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_archives_and_is_idempotent() {
        let (adapter, api) = setup(MockNotionApi::new());
        let bucket = notion_bucket();

        let stored = adapter.upsert(&bucket, Note::new("Buy milk")).await.unwrap();
        adapter.delete(&bucket, &stored).await.unwrap();
        adapter.delete(&bucket, &stored).await.unwrap();

        assert!(api.pages("db-1").is_empty());
        assert!(adapter.read_all(&bucket).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detach_clears_mirror_pointer_only() {
        let (adapter, api) = setup(MockNotionApi::new());
        let bucket = notion_bucket();
        let mirror = VendorEntity::chat_message(-100, 7, "h");

        let stored = adapter
            .upsert(
                &bucket,
                Note::new("Buy milk")
                    .with_tags(["errand"])
                    .with_mirror(mirror.clone()),
            )
            .await
            .unwrap();
        let query = stored.source_vendor_entity.clone().unwrap().query();

        adapter.detach(&bucket, &query).await.unwrap();

        let notes = adapter.read_all(&bucket).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].mirror_vendor_entity.is_none());
        assert!(notes[0].tags.contains("errand"));
        assert!(adapter
            .find_by_mirror_query(&bucket, &mirror.query())
            .await
            .unwrap()
            .is_none());

        // Detaching again does not write
        api.clear_calls();
        adapter.detach(&bucket, &query).await.unwrap();
        assert_eq!(api.write_count(), 0);
    }

    #[tokio::test]
    async fn test_entity_from_other_database_creates() {
        let (adapter, api) = setup(MockNotionApi::new());
        let bucket = notion_bucket();
        let foreign = Note::new("Buy milk")
            .with_source(VendorEntity::structured_page("db-other", "page-x", "h"));

        let stored = adapter.upsert(&bucket, foreign).await.unwrap();
        assert_eq!(stored.source_vendor_entity.unwrap().bucket_query_id(), "db-1");
        assert!(api
            .calls()
            .iter()
            .any(|c| matches!(c, NotionCall::Create { .. })));
    }
}
