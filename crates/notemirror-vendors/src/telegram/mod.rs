//! Telegram chat buckets.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use notemirror_vendors::telegram::{TelegramChatAdapter, TelegramClient, TelegramConfig};
//! # fn ledger() -> Arc<dyn notemirror_core::ChatMessageLedger> { unimplemented!() }
//!
//! let config = TelegramConfig::from_env().with_bot_token("123456:ABC");
//! let client = TelegramClient::new(config).unwrap();
//! let adapter = TelegramChatAdapter::new(Arc::new(client), ledger());
//! ```

mod adapter;
mod client;
mod error;
mod types;

pub use adapter::{note_from_message, TelegramChatAdapter};
pub use client::{TelegramApi, TelegramClient, TelegramConfig, TelegramResult};
pub use error::{to_notemirror_error, TelegramError, TelegramErrorCode};
pub use types::*;
