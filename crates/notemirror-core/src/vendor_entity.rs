//! Vendor entity identity: hashing, query construction, and merging.
//!
//! A vendor entity is a note's representation inside one backend. Its `hash`
//! lets adapters detect no-op updates without a network round trip.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::models::{VendorEntity, VendorEntityMetadata, VendorEntityQuery, VendorEntityType};

/// Normalize note text before hashing: CRLF to LF, surrounding whitespace trimmed.
pub fn normalize(content: &str) -> String {
    content.replace("\r\n", "\n").trim().to_string()
}

/// Content digest used for equality checks (lowercase hex MD5).
///
/// Not a security boundary; only used to skip writes whose content is
/// already present in the backend.
pub fn hash(content: &str) -> String {
    format!("{:x}", md5::compute(normalize(content)))
}

/// Backend-native reference to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRef<'a> {
    Chat { chat_id: i64, message_id: i64 },
    Page { database_id: &'a str, page_id: &'a str },
}

/// Build the lookup key for a native record reference.
pub fn build_query(reference: &MessageRef<'_>) -> VendorEntityQuery {
    match reference {
        MessageRef::Chat {
            chat_id,
            message_id,
        } => VendorEntityQuery {
            id: chat_entity_id(*chat_id, *message_id),
            vendor_entity_type: VendorEntityType::ChatMessage,
        },
        MessageRef::Page { page_id, .. } => VendorEntityQuery {
            id: (*page_id).to_string(),
            vendor_entity_type: VendorEntityType::StructuredPage,
        },
    }
}

fn chat_entity_id(chat_id: i64, message_id: i64) -> String {
    format!("{}_{}", chat_id, message_id)
}

/// Merge vendor entity lists, last writer wins per entity type.
///
/// Walks `[existing.., incoming..]` in reverse and keeps the first entity
/// seen for each type, so the result holds each type at most once and the
/// most recently supplied entity comes first.
pub fn merge<I>(existing: &[VendorEntity], incoming: I) -> Vec<VendorEntity>
where
    I: IntoIterator<Item = VendorEntity>,
{
    let combined: Vec<VendorEntity> = existing.iter().cloned().chain(incoming).collect();
    let mut seen = HashSet::new();
    combined
        .into_iter()
        .rev()
        .filter(|entity| seen.insert(entity.vendor_entity_type))
        .collect()
}

impl VendorEntity {
    /// Entity for a chat message.
    pub fn chat_message(chat_id: i64, message_id: i64, hash: impl Into<String>) -> Self {
        Self {
            id: chat_entity_id(chat_id, message_id),
            vendor_entity_type: VendorEntityType::ChatMessage,
            hash: hash.into(),
            metadata: VendorEntityMetadata::ChatMessage {
                chat_id,
                message_id,
            },
        }
    }

    /// Entity for a structured database page.
    pub fn structured_page(
        database_id: impl Into<String>,
        page_id: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        let page_id = page_id.into();
        Self {
            id: page_id.clone(),
            vendor_entity_type: VendorEntityType::StructuredPage,
            hash: hash.into(),
            metadata: VendorEntityMetadata::StructuredPage {
                database_id: database_id.into(),
                page_id,
            },
        }
    }

    pub fn query(&self) -> VendorEntityQuery {
        VendorEntityQuery {
            id: self.id.clone(),
            vendor_entity_type: self.vendor_entity_type,
        }
    }

    /// Backend-native id of the bucket holding this entity.
    pub fn bucket_query_id(&self) -> String {
        match &self.metadata {
            VendorEntityMetadata::ChatMessage { chat_id, .. } => chat_id.to_string(),
            VendorEntityMetadata::StructuredPage { database_id, .. } => database_id.clone(),
        }
    }

    /// Chat coordinates, if this is a chat message.
    pub fn chat_coordinates(&self) -> Option<(i64, i64)> {
        match self.metadata {
            VendorEntityMetadata::ChatMessage {
                chat_id,
                message_id,
            } => Some((chat_id, message_id)),
            _ => None,
        }
    }

    /// Same record and same content.
    pub fn same_as(&self, other: &VendorEntity) -> bool {
        self.id == other.id
            && self.vendor_entity_type == other.vendor_entity_type
            && self.hash == other.hash
    }
}

impl VendorEntityQuery {
    /// Parse a chat message query id (`{chat_id}_{message_id}`).
    pub fn chat_coordinates(&self) -> Result<(i64, i64)> {
        if self.vendor_entity_type != VendorEntityType::ChatMessage {
            return Err(Error::UnsupportedAction(format!(
                "{} query has no chat coordinates",
                self.vendor_entity_type
            )));
        }
        // Chat ids may be negative, message ids never are
        let (chat, message) = self
            .id
            .rsplit_once('_')
            .ok_or_else(|| Error::InvalidResource(format!("bad chat query id '{}'", self.id)))?;
        let chat_id = chat
            .parse()
            .map_err(|_| Error::InvalidResource(format!("bad chat id in '{}'", self.id)))?;
        let message_id = message
            .parse()
            .map_err(|_| Error::InvalidResource(format!("bad message id in '{}'", self.id)))?;
        Ok((chat_id, message_id))
    }
}

/// Encode/decode contract for vendor entity lists stored inside a backend field.
pub struct VendorEntityCodec;

impl VendorEntityCodec {
    pub fn encode(entities: &[VendorEntity]) -> Result<String> {
        Ok(serde_json::to_string(entities)?)
    }

    /// Decode a stored list. Blank input is an empty list.
    pub fn decode(raw: &str) -> Result<Vec<VendorEntity>> {
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(raw)
            .map_err(|e| Error::InvalidResource(format!("undecodable vendor entities: {}", e)))
    }
}
