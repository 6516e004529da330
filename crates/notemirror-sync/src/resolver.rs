//! Storage-backed link resolution.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use notemirror_core::{sort_by_priority, Link, LinkRepository, Result};

/// Loads the links of a mirror bucket in evaluation order.
#[derive(Clone)]
pub struct LinkResolver {
    links: Arc<dyn LinkRepository>,
}

impl LinkResolver {
    pub fn new(links: Arc<dyn LinkRepository>) -> Self {
        Self { links }
    }

    /// Links targeting `mirror_bucket_id`, highest priority first. Links of
    /// equal priority keep the repository's insertion order.
    pub async fn resolve(&self, user_id: Uuid, mirror_bucket_id: Uuid) -> Result<Vec<Link>> {
        let mut links = self
            .links
            .get_links_by_mirror_bucket_id(user_id, mirror_bucket_id)
            .await?;
        sort_by_priority(&mut links);
        debug!(
            subsystem = "sync",
            component = "resolver",
            %user_id,
            %mirror_bucket_id,
            link_count = links.len(),
            "Links resolved"
        );
        Ok(links)
    }
}
