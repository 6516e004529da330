//! # notemirror-db
//!
//! PostgreSQL storage gateway for notemirror.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for buckets, links and integrations
//! - The chat message ledger used by chat buckets
//!
//! ## Example
//!
//! ```rust,ignore
//! use notemirror_db::{Database, BucketRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/notemirror").await?;
//!     let bucket = db.buckets.get_bucket_by_query_id(user_id, "-100123").await?;
//!     println!("Bucket: {:?}", bucket);
//!     Ok(())
//! }
//! ```
pub mod buckets;
pub mod chat_ledger;
pub mod integrations;
pub mod links;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

// Re-export core types
pub use notemirror_core::*;

// Re-export repository implementations
pub use buckets::PgBucketRepository;
pub use chat_ledger::PgChatMessageLedger;
pub use integrations::PgIntegrationRepository;
pub use links::PgLinkRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Schema of the storage contract, applied by [`Database::migrate`] and the
/// test fixtures.
pub const SCHEMA_SQL: &str = include_str!("../../../migrations/20261001000000_sync_core.sql");

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Bucket repository.
    pub buckets: Arc<PgBucketRepository>,
    /// Link repository.
    pub links: Arc<PgLinkRepository>,
    /// Integration credential repository.
    pub integrations: Arc<PgIntegrationRepository>,
    /// Chat message ledger for chat buckets.
    pub chat_ledger: Arc<PgChatMessageLedger>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            buckets: Arc::new(PgBucketRepository::new(pool.clone())),
            links: Arc::new(PgLinkRepository::new(pool.clone())),
            integrations: Arc::new(PgIntegrationRepository::new(pool.clone())),
            chat_ledger: Arc::new(PgChatMessageLedger::new(pool.clone())),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_declares_every_table() {
        for table in ["integration", "bucket", "bucket_link", "chat_message"] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {} ", table)),
                "missing table {}",
                table
            );
        }
    }
}
