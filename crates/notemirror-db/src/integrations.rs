//! Integration repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use notemirror_core::{
    new_v7, CreateIntegrationRequest, Error, Integration, IntegrationRepository,
    IntegrationType, Result,
};

fn integration_from_row(row: &PgRow) -> Result<Integration> {
    let integration_type: String = row.get("integration_type");
    Ok(Integration {
        id: row.get("id"),
        user_id: row.get("user_id"),
        integration_type: integration_type.parse::<IntegrationType>()?,
        credentials: row.get("credentials"),
        created_at_utc: row.get("created_at_utc"),
    })
}

/// PostgreSQL implementation of IntegrationRepository.
pub struct PgIntegrationRepository {
    pool: Pool<Postgres>,
}

impl PgIntegrationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntegrationRepository for PgIntegrationRepository {
    async fn get_integration_by_id(
        &self,
        user_id: Uuid,
        integration_id: Uuid,
    ) -> Result<Option<Integration>> {
        let row = sqlx::query(
            "SELECT id, user_id, integration_type, credentials, created_at_utc
             FROM integration WHERE user_id = $1 AND id = $2",
        )
        .bind(user_id)
        .bind(integration_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(integration_from_row).transpose()
    }

    async fn create_integration(&self, req: CreateIntegrationRequest) -> Result<Integration> {
        let row = sqlx::query(
            "INSERT INTO integration (id, user_id, integration_type, credentials, created_at_utc)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, user_id, integration_type, credentials, created_at_utc",
        )
        .bind(new_v7())
        .bind(req.user_id)
        .bind(req.integration_type.as_str())
        .bind(&req.credentials)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        integration_from_row(&row)
    }
}
