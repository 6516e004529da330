//! Notion database buckets.
//!
//! Each page of the database is one note. Content lives in the title
//! property; the mirror pointer and the vendor entity list live in two
//! rich-text properties so the pointer can be filtered on.

mod adapter;
mod client;
mod error;
pub mod properties;
mod types;

pub use adapter::NotionDatabaseAdapter;
pub use client::{NotionApi, NotionClient, NotionConfig, NotionSchema};
pub use error::{to_notemirror_error, NotionErrorCode};
pub use types::*;
