//! Mapping between Notion page properties and notes.

use std::collections::BTreeSet;

use serde_json::{json, Value};

use notemirror_core::defaults::NOTION_RICH_TEXT_LIMIT;
use notemirror_core::{
    hash, merge, Error, Note, NoteStatus, Result, VendorEntity, VendorEntityCodec,
    VendorEntityType,
};

use super::client::NotionSchema;
use super::types::{Page, Properties};

/// Concatenated plain text of a title or rich_text property.
fn plain_text(property: &Value) -> Option<String> {
    let kind = property.get("type")?.as_str()?;
    let parts = property.get(kind)?.as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|part| {
                part.get("plain_text")
                    .or_else(|| part.pointer("/text/content"))
                    .and_then(Value::as_str)
            })
            .collect(),
    )
}

/// Rich text segments, split to stay under Notion's per-segment limit.
fn rich_text(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    let segments: Vec<Value> = chars
        .chunks(NOTION_RICH_TEXT_LIMIT)
        .map(|chunk| {
            json!({
                "type": "text",
                "text": { "content": chunk.iter().collect::<String>() }
            })
        })
        .collect();
    Value::Array(segments)
}

/// Multi-select option names cannot contain commas.
pub fn option_name(tag: &str) -> String {
    tag.replace(',', " ").trim().to_string()
}

/// The tag set as it will read back after a write.
pub fn stored_tags(tags: &BTreeSet<String>) -> BTreeSet<String> {
    tags.iter()
        .map(|t| option_name(t))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Decode a page into a note.
///
/// Missing optional properties read as empty; a missing title or an
/// undecodable entity list is an `InvalidResource`.
pub fn page_to_note(schema: &NotionSchema, database_id: &str, page: &Page) -> Result<Note> {
    let content = page
        .properties
        .get(&schema.content)
        .filter(|p| p.get("type").and_then(Value::as_str) == Some("title"))
        .and_then(plain_text)
        .ok_or_else(|| {
            Error::InvalidResource(format!(
                "page {} has no '{}' title property",
                page.id, schema.content
            ))
        })?;

    let tags = page
        .properties
        .get(&schema.tags)
        .and_then(|p| p.get("multi_select"))
        .and_then(Value::as_array)
        .map(|options| {
            options
                .iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let status = match page
        .properties
        .get(&schema.status)
        .and_then(|p| p.pointer("/select/name"))
        .and_then(Value::as_str)
    {
        Some(name) => name.parse::<NoteStatus>()?,
        None => NoteStatus::default(),
    };

    let encoded = page
        .properties
        .get(&schema.vendor_entities)
        .and_then(plain_text)
        .unwrap_or_default();
    let mirror_vendor_entity = VendorEntityCodec::decode(&encoded)
        .map_err(|e| Error::InvalidResource(format!("page {}: {}", page.id, e)))?
        .into_iter()
        .find(|e| e.vendor_entity_type != VendorEntityType::StructuredPage);

    let source = VendorEntity::structured_page(database_id, page.id.clone(), hash(&content));
    Ok(Note {
        content,
        tags,
        source_vendor_entity: Some(source),
        mirror_vendor_entity,
        status,
    })
}

/// Encode the entity list stored alongside a page.
fn encoded_entities(
    page_entity: Option<&VendorEntity>,
    mirror: Option<&VendorEntity>,
) -> Result<String> {
    let existing: Vec<VendorEntity> = page_entity.into_iter().cloned().collect();
    VendorEntityCodec::encode(&merge(&existing, mirror.cloned()))
}

/// Full property set for writing `note`.
pub fn note_properties(schema: &NotionSchema, note: &Note) -> Result<Properties> {
    let page_entity = note
        .source_vendor_entity
        .as_ref()
        .filter(|e| e.vendor_entity_type == VendorEntityType::StructuredPage);
    let mirror = note.mirror_vendor_entity.as_ref();

    let tags: Vec<Value> = stored_tags(&note.tags)
        .into_iter()
        .map(|name| json!({ "name": name }))
        .collect();

    let mut properties = Properties::new();
    properties.insert(schema.content.clone(), json!({ "title": rich_text(&note.content) }));
    properties.insert(schema.tags.clone(), json!({ "multi_select": tags }));
    properties.insert(
        schema.status.clone(),
        json!({ "select": { "name": note.status.as_str() } }),
    );
    properties.extend(mirror_properties(schema, page_entity, mirror)?);
    Ok(properties)
}

/// Only the mirror pointer properties.
pub fn mirror_properties(
    schema: &NotionSchema,
    page_entity: Option<&VendorEntity>,
    mirror: Option<&VendorEntity>,
) -> Result<Properties> {
    let mirror_id = mirror.map(|m| m.id.as_str()).unwrap_or_default();
    let mut properties = Properties::new();
    properties.insert(schema.mirror.clone(), json!({ "rich_text": rich_text(mirror_id) }));
    properties.insert(
        schema.vendor_entities.clone(),
        json!({ "rich_text": rich_text(&encoded_entities(page_entity, mirror)?) }),
    );
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(properties: Value) -> Page {
        Page {
            id: "page-1".into(),
            archived: false,
            properties: properties.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_page_to_note_reads_all_properties() {
        let mirror = VendorEntity::chat_message(-100, 7, "h");
        let encoded = VendorEntityCodec::encode(&[mirror.clone()]).unwrap();
        let page = page(json!({
            "Name": {"type": "title", "title": [{"plain_text": "Buy "}, {"plain_text": "milk"}]},
            "Tags": {"type": "multi_select", "multi_select": [{"name": "errand"}]},
            "Status": {"type": "select", "select": {"name": "In progress"}},
            "Vendor Entities": {"type": "rich_text", "rich_text": [{"plain_text": encoded}]}
        }));

        let note = page_to_note(&NotionSchema::default(), "db-1", &page).unwrap();
        assert_eq!(note.content, "Buy milk");
        assert!(note.tags.contains("errand"));
        assert_eq!(note.status, NoteStatus::InProgress);
        assert_eq!(note.mirror_vendor_entity, Some(mirror));
        let source = note.source_vendor_entity.unwrap();
        assert_eq!(source.id, "page-1");
        assert_eq!(source.hash, hash("Buy milk"));
    }

    #[test]
    fn test_page_without_title_is_invalid() {
        let page = page(json!({"Tags": {"type": "multi_select", "multi_select": []}}));
        let err = page_to_note(&NotionSchema::default(), "db-1", &page).unwrap_err();
        assert!(matches!(err, Error::InvalidResource(_)));
    }

    #[test]
    fn test_missing_optional_properties_default() {
        let page = page(json!({"Name": {"type": "title", "title": []}}));
        let note = page_to_note(&NotionSchema::default(), "db-1", &page).unwrap();
        assert_eq!(note.content, "");
        assert!(note.tags.is_empty());
        assert_eq!(note.status, NoteStatus::NotStarted);
        assert!(note.mirror_vendor_entity.is_none());
    }

    #[test]
    fn test_garbage_entities_are_invalid() {
        let page = page(json!({
            "Name": {"type": "title", "title": [{"plain_text": "x"}]},
            "Vendor Entities": {"type": "rich_text", "rich_text": [{"plain_text": "a|b|c"}]}
        }));
        let err = page_to_note(&NotionSchema::default(), "db-1", &page).unwrap_err();
        assert!(matches!(err, Error::InvalidResource(_)));
    }

    #[test]
    fn test_properties_roundtrip_through_page() {
        let schema = NotionSchema::default();
        let mirror = VendorEntity::chat_message(-100, 7, hash("Buy milk"));
        let note = Note::new("Buy milk")
            .with_tags(["errand", "synced"])
            .with_status(NoteStatus::Done)
            .with_mirror(mirror.clone());

        let properties = note_properties(&schema, &note).unwrap();
        assert_eq!(properties["Mirror"]["rich_text"][0]["text"]["content"], "-100_7");

        // Notion echoes written text back as plain_text; text.content is read too
        let mut stored = Properties::new();
        for (name, value) in properties {
            let kind = value.as_object().unwrap().keys().next().unwrap().clone();
            let mut with_type = value.clone();
            with_type["type"] = json!(kind);
            stored.insert(name, with_type);
        }
        let back = page_to_note(
            &schema,
            "db-1",
            &Page {
                id: "p".into(),
                archived: false,
                properties: stored,
            },
        )
        .unwrap();
        assert_eq!(back.content, "Buy milk");
        assert_eq!(back.tags, note.tags);
        assert_eq!(back.status, NoteStatus::Done);
        assert_eq!(back.mirror_vendor_entity, Some(mirror));
    }

    #[test]
    fn test_long_content_is_split() {
        let text = "a".repeat(NOTION_RICH_TEXT_LIMIT + 5);
        let segments = rich_text(&text);
        assert_eq!(segments.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_option_name_strips_commas() {
        assert_eq!(option_name("a,b"), "a b");
    }
}
