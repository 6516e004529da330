//! # notemirror-vendors
//!
//! Bucket adapters for the backends notes are mirrored between.
//!
//! This crate provides:
//! - Telegram chat adapter with its Bot API client and chat message ledger use
//! - Notion database adapter with its REST client and property mapping
//! - Vendor error classification into [`notemirror_core::Error`]
//! - [`VendorAdapterFactory`], choosing an adapter per bucket
//!
//! # Feature Flags
//!
//! - `mock`: in-memory vendor APIs, chat ledger and adapter factory for tests

pub mod factory;
pub mod notion;
pub mod telegram;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use notemirror_core::*;

pub use factory::{VendorAdapterFactory, NOTION_SECRET_KEY, TELEGRAM_TOKEN_KEY};
pub use notion::{NotionClient, NotionConfig, NotionDatabaseAdapter};
pub use telegram::{TelegramChatAdapter, TelegramClient, TelegramConfig};
