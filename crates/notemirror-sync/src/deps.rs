//! Collaborators injected into the orchestrator.

use std::sync::Arc;

use notemirror_core::{AdapterFactory, BucketRepository, LinkRepository};
use notemirror_db::Database;
use notemirror_vendors::VendorAdapterFactory;

/// Storage and adapter access for one orchestrator.
#[derive(Clone)]
pub struct SyncDeps {
    pub buckets: Arc<dyn BucketRepository>,
    pub links: Arc<dyn LinkRepository>,
    pub adapters: Arc<dyn AdapterFactory>,
}

impl SyncDeps {
    pub fn new(
        buckets: Arc<dyn BucketRepository>,
        links: Arc<dyn LinkRepository>,
        adapters: Arc<dyn AdapterFactory>,
    ) -> Self {
        Self {
            buckets,
            links,
            adapters,
        }
    }

    /// Postgres repositories plus vendor adapters configured from the
    /// environment.
    pub fn from_database(db: &Database) -> Self {
        let adapters =
            VendorAdapterFactory::from_env(db.integrations.clone(), db.chat_ledger.clone());
        Self {
            buckets: db.buckets.clone(),
            links: db.links.clone(),
            adapters: Arc::new(adapters),
        }
    }
}
