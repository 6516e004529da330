//! Per-(user, mirror bucket) mutual exclusion for sync operations.
//!
//! A bulk pass does read-then-write ownership transfer on mirror pointers.
//! Two overlapping passes over the same mirror bucket could both decide they
//! own the same mirror slot, so every pass and every triggered operation
//! holds the lock of its mirror bucket for its whole duration. Different
//! mirror buckets, and different users, never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;
use uuid::Uuid;

type LockKey = (Uuid, Uuid);

/// Table of async locks keyed by `(user_id, mirror_bucket_id)`.
#[derive(Clone, Default)]
pub struct BucketLocks {
    locks: Arc<Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>>,
}

impl BucketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: LockKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop slots nobody is holding or waiting on
        locks.retain(|k, lock| *k == key || Arc::strong_count(lock) > 1);
        locks.entry(key).or_default().clone()
    }

    /// Wait for exclusive access to a mirror bucket.
    pub async fn acquire(&self, user_id: Uuid, mirror_bucket_id: Uuid) -> OwnedMutexGuard<()> {
        let guard = self.slot((user_id, mirror_bucket_id)).lock_owned().await;
        trace!(
            subsystem = "sync",
            component = "locks",
            %user_id,
            %mirror_bucket_id,
            "Bucket lock acquired"
        );
        guard
    }

    /// Number of tracked slots.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
