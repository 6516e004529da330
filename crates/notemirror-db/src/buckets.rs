//! Bucket repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use notemirror_core::{
    new_v7, Bucket, BucketRepository, BucketType, CreateBucketRequest, Error, Result,
};

pub(crate) const BUCKET_COLUMNS: &str =
    "b.id, b.user_id, b.query_id, b.bucket_type, b.metadata, b.integration_id, b.created_at_utc";

/// Map a `bucket` row (selected with [`BUCKET_COLUMNS`]) to a [`Bucket`].
pub(crate) fn bucket_from_row(row: &PgRow) -> Result<Bucket> {
    let bucket_type: String = row.get("bucket_type");
    Ok(Bucket {
        id: row.get("id"),
        user_id: row.get("user_id"),
        query_id: row.get("query_id"),
        bucket_type: bucket_type.parse::<BucketType>()?,
        metadata: row.get("metadata"),
        integration_id: row.get("integration_id"),
        created_at_utc: row.get("created_at_utc"),
    })
}

/// PostgreSQL implementation of BucketRepository.
pub struct PgBucketRepository {
    pool: Pool<Postgres>,
}

impl PgBucketRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BucketRepository for PgBucketRepository {
    async fn get_bucket_by_id(&self, user_id: Uuid, bucket_id: Uuid) -> Result<Option<Bucket>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bucket b WHERE b.user_id = $1 AND b.id = $2",
            BUCKET_COLUMNS
        ))
        .bind(user_id)
        .bind(bucket_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(bucket_from_row).transpose()
    }

    async fn get_bucket_by_query_id(
        &self,
        user_id: Uuid,
        query_id: &str,
    ) -> Result<Option<Bucket>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bucket b WHERE b.user_id = $1 AND b.query_id = $2",
            BUCKET_COLUMNS
        ))
        .bind(user_id)
        .bind(query_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(bucket_from_row).transpose()
    }

    async fn create_bucket(&self, req: CreateBucketRequest) -> Result<Bucket> {
        // Idempotent on (user_id, query_id): re-registering a chat or database
        // refreshes its metadata and returns the original id.
        let row = sqlx::query(&format!(
            "INSERT INTO bucket AS b (id, user_id, query_id, bucket_type, metadata, integration_id, created_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (user_id, query_id) DO UPDATE
                 SET metadata = EXCLUDED.metadata,
                     integration_id = COALESCE(EXCLUDED.integration_id, b.integration_id)
             RETURNING {}",
            BUCKET_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.user_id)
        .bind(&req.query_id)
        .bind(req.bucket_type.as_str())
        .bind(req.metadata.unwrap_or_else(|| serde_json::json!({})))
        .bind(req.integration_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        bucket_from_row(&row)
    }

    async fn delete_bucket_by_id(&self, user_id: Uuid, bucket_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bucket WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(bucket_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
