//! Structured logging schema and field name constants for notemirror.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query a sync pass end to end by the same names.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | A sync pass or trigger failed and nothing was retried |
//! | WARN  | Recoverable issue, automatic fallback applied or note skipped |
//! | INFO  | Pass start/completion, bucket ownership changes |
//! | DEBUG | Routing decisions, vendor calls, fast-path skips |
//! | TRACE | Per-link template evaluation |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "sync", "db", "vendor"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "orchestrator", "telegram", "notion", "pool", "deferred"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "bulk_sync", "upsert", "edit_fallback", "detach"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Tenant whose data is being synchronized.
pub const USER_ID: &str = "user_id";

/// Bucket UUID being operated on.
pub const BUCKET_ID: &str = "bucket_id";

/// Mirror bucket of the current pass.
pub const MIRROR_BUCKET_ID: &str = "mirror_bucket_id";

/// Link UUID that routed a note.
pub const LINK_ID: &str = "link_id";

/// Vendor entity id (`chat_message` or `structured_page`).
pub const VENDOR_ENTITY_ID: &str = "vendor_entity_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of notes read from a bucket.
pub const NOTE_COUNT: &str = "note_count";

/// Number of links considered for a note.
pub const LINK_COUNT: &str = "link_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Seconds a vendor asked us to wait.
pub const RETRY_AFTER_SECS: &str = "retry_after_secs";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_snake_case() {
        for field in [
            SUBSYSTEM,
            COMPONENT,
            OPERATION,
            USER_ID,
            BUCKET_ID,
            MIRROR_BUCKET_ID,
            LINK_ID,
            VENDOR_ENTITY_ID,
            DURATION_MS,
            NOTE_COUNT,
            LINK_COUNT,
            ERROR_MSG,
            RETRY_AFTER_SECS,
        ] {
            assert!(field
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
