//! Centralized default constants for notemirror.
//!
//! **This module is the single source of truth** for shared default values.
//! Config structs in the other crates reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// TELEGRAM
// =============================================================================

/// Telegram Bot API base URL.
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Request timeout for Bot API calls, in seconds.
pub const TELEGRAM_TIMEOUT_SECS: u64 = 30;

/// Retries after a `429 Too Many Requests` before giving up on a call.
pub const TELEGRAM_MAX_RETRIES: u32 = 3;

/// Upper bound on a single `retry_after` sleep, in seconds.
pub const TELEGRAM_MAX_RETRY_AFTER_SECS: u64 = 30;

// =============================================================================
// NOTION
// =============================================================================

/// Notion API base URL.
pub const NOTION_API_URL: &str = "https://api.notion.com/v1";

/// `Notion-Version` header sent with every request.
pub const NOTION_VERSION: &str = "2022-06-28";

/// Request timeout for Notion calls, in seconds.
pub const NOTION_TIMEOUT_SECS: u64 = 30;

/// Page size for database queries (Notion maximum).
pub const NOTION_PAGE_SIZE: u32 = 100;

/// Notion rich text objects are limited to this many characters.
pub const NOTION_RICH_TEXT_LIMIT: usize = 2000;

pub const NOTION_PROP_CONTENT: &str = "Name";
pub const NOTION_PROP_TAGS: &str = "Tags";
pub const NOTION_PROP_STATUS: &str = "Status";
pub const NOTION_PROP_MIRROR: &str = "Mirror";
pub const NOTION_PROP_VENDOR_ENTITIES: &str = "Vendor Entities";

// =============================================================================
// SYNC
// =============================================================================

/// Delay before a status reaction is cleared from a chat message.
pub const REACTION_CLEAR_DELAY_MS: u64 = 3_000;

/// Default reaction → status mapping.
pub const REACTION_STATUSES: &[(&str, &str)] = &[
    ("👍", "done"),
    ("👀", "in_progress"),
    ("🗑", "to_delete"),
];
