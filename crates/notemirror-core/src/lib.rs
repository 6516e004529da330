//! # notemirror-core
//!
//! Core types, traits, and routing primitives for notemirror.
//!
//! This crate provides the domain model (notes, buckets, links, vendor
//! entities), the error taxonomy, the storage and adapter traits the other
//! crates implement, and the pure parts of the sync core: content hashing,
//! template matching and link routing.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod routing;
pub mod tags;
pub mod template;
pub mod traits;
pub mod uuid_utils;
pub mod vendor_entity;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use routing::{resolve_matching, sort_by_priority, truncate_at_stop, MatchedLink, TemplateCache};
pub use tags::{extract_hashtags, normalize_tag, render_with_tags};
pub use template::{match_template, CompiledTemplate, MatchResult};
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
pub use vendor_entity::{build_query, hash, merge, MessageRef, VendorEntityCodec};
