//! Link repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use notemirror_core::{
    new_v7, Bucket, CreateLinkRequest, Error, Link, LinkRepository, LinkSettings, Result,
};

use crate::buckets::{bucket_from_row, BUCKET_COLUMNS};

const LINK_COLUMNS: &str = "l.id, l.user_id, l.source_bucket_id, l.mirror_bucket_id, l.priority, \
     l.template, l.default_tags, l.settings, l.created_at_utc";

fn link_from_row(row: &PgRow) -> Result<Link> {
    let settings: serde_json::Value = row.get("settings");
    let settings: LinkSettings = serde_json::from_value(settings)?;
    Ok(Link {
        id: row.get("id"),
        user_id: row.get("user_id"),
        source_bucket_id: row.get("source_bucket_id"),
        mirror_bucket_id: row.get("mirror_bucket_id"),
        priority: row.get("priority"),
        template: row.get("template"),
        default_tags: row.get("default_tags"),
        settings,
        created_at_utc: row.get("created_at_utc"),
    })
}

/// PostgreSQL implementation of LinkRepository.
pub struct PgLinkRepository {
    pool: Pool<Postgres>,
}

impl PgLinkRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn get_links_by_mirror_bucket_id(
        &self,
        user_id: Uuid,
        mirror_bucket_id: Uuid,
    ) -> Result<Vec<Link>> {
        // Insertion order; priority sorting is the resolver's job so that
        // ties stay stable regardless of the query plan.
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bucket_link l
             WHERE l.user_id = $1 AND l.mirror_bucket_id = $2
             ORDER BY l.created_at_utc, l.id",
            LINK_COLUMNS
        ))
        .bind(user_id)
        .bind(mirror_bucket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(link_from_row).collect()
    }

    async fn get_linked_source_buckets(
        &self,
        user_id: Uuid,
        mirror_bucket_id: Uuid,
    ) -> Result<Vec<Bucket>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bucket b
             WHERE b.user_id = $1 AND b.id IN (
                 SELECT l.source_bucket_id FROM bucket_link l
                 WHERE l.user_id = $1 AND l.mirror_bucket_id = $2
             )
             ORDER BY b.created_at_utc, b.id",
            BUCKET_COLUMNS
        ))
        .bind(user_id)
        .bind(mirror_bucket_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(bucket_from_row).collect()
    }

    async fn create_link(&self, req: CreateLinkRequest) -> Result<Link> {
        let settings = serde_json::to_value(req.settings)?;
        let row = sqlx::query(&format!(
            "INSERT INTO bucket_link AS l
                 (id, user_id, source_bucket_id, mirror_bucket_id, priority, template,
                  default_tags, settings, created_at_utc)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            LINK_COLUMNS
        ))
        .bind(new_v7())
        .bind(req.user_id)
        .bind(req.source_bucket_id)
        .bind(req.mirror_bucket_id)
        .bind(req.priority)
        .bind(&req.template)
        .bind(&req.default_tags)
        .bind(settings)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::InvalidResource(format!(
                    "link from bucket {} to bucket {} with this template already exists",
                    req.source_bucket_id, req.mirror_bucket_id
                ))
            }
            other => Error::Database(other),
        })?;

        link_from_row(&row)
    }

    async fn delete_link_by_id(&self, user_id: Uuid, link_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bucket_link WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(link_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
