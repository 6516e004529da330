//! Chat message ledger: the structured side-table behind chat buckets.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use notemirror_core::{
    ChatMessageLedger, ChatMessageRecord, Error, NoteStatus, Result, VendorEntity,
};

const COLUMNS: &str = "bucket_id, chat_id, message_id, content, tags, hash, status, \
     mirror_vendor_entity, updated_at_utc";

fn record_from_row(row: &PgRow) -> Result<ChatMessageRecord> {
    let status: String = row.get("status");
    let mirror: Option<serde_json::Value> = row.get("mirror_vendor_entity");
    let mirror_vendor_entity = mirror
        .map(serde_json::from_value::<VendorEntity>)
        .transpose()
        .map_err(|e| Error::InvalidResource(format!("chat ledger mirror entity: {}", e)))?;
    Ok(ChatMessageRecord {
        bucket_id: row.get("bucket_id"),
        chat_id: row.get("chat_id"),
        message_id: row.get("message_id"),
        content: row.get("content"),
        tags: row.get("tags"),
        hash: row.get("hash"),
        status: status.parse::<NoteStatus>()?,
        mirror_vendor_entity,
        updated_at_utc: row.get("updated_at_utc"),
    })
}

/// PostgreSQL implementation of ChatMessageLedger.
pub struct PgChatMessageLedger {
    pool: Pool<Postgres>,
}

impl PgChatMessageLedger {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatMessageLedger for PgChatMessageLedger {
    async fn get(&self, bucket_id: Uuid, message_id: i64) -> Result<Option<ChatMessageRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM chat_message WHERE bucket_id = $1 AND message_id = $2",
            COLUMNS
        ))
        .bind(bucket_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list(&self, bucket_id: Uuid) -> Result<Vec<ChatMessageRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chat_message WHERE bucket_id = $1 ORDER BY message_id",
            COLUMNS
        ))
        .bind(bucket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(record_from_row).collect()
    }

    async fn find_by_mirror(
        &self,
        bucket_id: Uuid,
        mirror_id: &str,
    ) -> Result<Option<ChatMessageRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM chat_message
             WHERE bucket_id = $1 AND mirror_id = $2
             ORDER BY message_id DESC LIMIT 1",
            COLUMNS
        ))
        .bind(bucket_id)
        .bind(mirror_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn put(&self, record: ChatMessageRecord) -> Result<()> {
        let mirror_id = record.mirror_vendor_entity.as_ref().map(|e| e.id.clone());
        let mirror_json = record
            .mirror_vendor_entity
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            "INSERT INTO chat_message
                 (bucket_id, chat_id, message_id, content, tags, hash, status,
                  mirror_id, mirror_vendor_entity, updated_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (bucket_id, message_id) DO UPDATE SET
                 chat_id = EXCLUDED.chat_id,
                 content = EXCLUDED.content,
                 tags = EXCLUDED.tags,
                 hash = EXCLUDED.hash,
                 status = EXCLUDED.status,
                 mirror_id = EXCLUDED.mirror_id,
                 mirror_vendor_entity = EXCLUDED.mirror_vendor_entity,
                 updated_at_utc = EXCLUDED.updated_at_utc",
        )
        .bind(record.bucket_id)
        .bind(record.chat_id)
        .bind(record.message_id)
        .bind(&record.content)
        .bind(&record.tags)
        .bind(&record.hash)
        .bind(record.status.as_str())
        .bind(mirror_id)
        .bind(mirror_json)
        .bind(record.updated_at_utc)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn remove(&self, bucket_id: Uuid, message_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_message WHERE bucket_id = $1 AND message_id = $2")
            .bind(bucket_id)
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
