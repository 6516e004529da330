//! # notemirror-sync
//!
//! Note synchronization for notemirror.
//!
//! This crate provides:
//! - Storage-backed link resolution in priority order
//! - The sync orchestrator: triggered propagation of single mirror-side
//!   changes and bulk reconciliation of whole source buckets
//! - Per-(user, mirror bucket) locking of sync operations
//! - Deferred background tasks (reaction clearing)
//!
//! ## Example
//!
//! ```ignore
//! use notemirror_db::Database;
//! use notemirror_sync::{SyncConfig, SyncDeps, SyncOrchestrator};
//!
//! let db = Database::connect("postgres://...").await?;
//! let orchestrator = SyncOrchestrator::new(SyncDeps::from_database(&db), SyncConfig::from_env());
//!
//! let report = orchestrator.trigger_bulk_sync(user_id, mirror_bucket_id).await?;
//! println!("created {} detached {}", report.created, report.detached);
//! ```

pub mod config;
pub mod deferred;
pub mod deps;
pub mod locks;
pub mod orchestrator;
pub mod resolver;

// Re-export core types
pub use notemirror_core::*;

pub use config::{InvalidResourcePolicy, SyncConfig};
pub use deferred::DeferredTasks;
pub use deps::SyncDeps;
pub use locks::BucketLocks;
pub use orchestrator::SyncOrchestrator;
pub use resolver::LinkResolver;
