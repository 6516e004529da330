//! In-memory vendor APIs and chat ledger for deterministic testing.
//!
//! The mocks keep enough state to behave like the real services for the
//! calls the adapters make, and log every call so tests can assert on
//! vendor writes.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use notemirror_vendors::mock::{MemoryChatLedger, MockTelegramApi};
//! use notemirror_vendors::telegram::TelegramChatAdapter;
//!
//! let api = MockTelegramApi::new().rejecting_edits();
//! let adapter = TelegramChatAdapter::new(Arc::new(api.clone()), Arc::new(MemoryChatLedger::new()));
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use notemirror_core::{
    AdapterFactory, Bucket, BucketAdapter, BucketType, ChatMessageLedger, ChatMessageRecord,
    Error, Note, Result,
};

use crate::notion::properties::note_properties;
use crate::notion::{NotionApi, NotionSchema, Page, PageList, Properties};
use crate::telegram::{
    Chat, Message, TelegramApi, TelegramError, TelegramErrorCode, TelegramResult,
};

// =============================================================================
// TELEGRAM
// =============================================================================

/// A recorded Bot API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelegramCall {
    Send {
        chat_id: i64,
        text: String,
    },
    Edit {
        chat_id: i64,
        message_id: i64,
        text: String,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
    },
    React {
        chat_id: i64,
        message_id: i64,
        emoji: Option<String>,
    },
}

#[derive(Debug, Default)]
struct TelegramState {
    next_message_id: i64,
    messages: BTreeMap<(i64, i64), String>,
    reactions: HashMap<(i64, i64), String>,
    calls: Vec<TelegramCall>,
    reject_edits: bool,
    fail_deletes: bool,
    rate_limited_sends: u32,
}

/// Mock Telegram chat service.
#[derive(Clone, Default)]
pub struct MockTelegramApi {
    state: Arc<Mutex<TelegramState>>,
}

impl MockTelegramApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every edit fails with "message can't be edited".
    pub fn rejecting_edits(self) -> Self {
        self.state.lock().unwrap().reject_edits = true;
        self
    }

    /// Every delete fails with "message can't be deleted".
    pub fn failing_deletes(self) -> Self {
        self.state.lock().unwrap().fail_deletes = true;
        self
    }

    /// The next `count` sends are rate limited.
    pub fn rate_limiting_sends(self, count: u32) -> Self {
        self.state.lock().unwrap().rate_limited_sends = count;
        self
    }

    /// Simulate a user posting a message. Not logged as a bot call.
    pub fn post(&self, chat_id: i64, text: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_message_id += 1;
        let message_id = state.next_message_id;
        state.messages.insert((chat_id, message_id), text.to_string());
        message_id
    }

    pub fn text(&self, chat_id: i64, message_id: i64) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(&(chat_id, message_id))
            .cloned()
    }

    /// Visible messages of a chat, oldest first.
    pub fn messages(&self, chat_id: i64) -> Vec<(i64, String)> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|((chat, _), _)| *chat == chat_id)
            .map(|((_, id), text)| (*id, text.clone()))
            .collect()
    }

    pub fn reaction(&self, chat_id: i64, message_id: i64) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .reactions
            .get(&(chat_id, message_id))
            .cloned()
    }

    pub fn calls(&self) -> Vec<TelegramCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls that change what the chat shows.
    pub fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, TelegramCall::React { .. }))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

#[async_trait]
impl TelegramApi for MockTelegramApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<Message> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TelegramCall::Send {
            chat_id,
            text: text.to_string(),
        });
        if state.rate_limited_sends > 0 {
            state.rate_limited_sends -= 1;
            return Err(TelegramError::rate_limited(1));
        }
        state.next_message_id += 1;
        let message_id = state.next_message_id;
        state.messages.insert((chat_id, message_id), text.to_string());
        Ok(Message {
            message_id,
            chat: Chat { id: chat_id },
            text: Some(text.to_string()),
            date: 0,
        })
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> TelegramResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TelegramCall::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        if state.reject_edits {
            return Err(TelegramError::new(
                TelegramErrorCode::MessageCantBeEdited,
                "Bad Request: message can't be edited",
            ));
        }
        match state.messages.get_mut(&(chat_id, message_id)) {
            None => Err(TelegramError::new(
                TelegramErrorCode::MessageNotFound,
                "Bad Request: message to edit not found",
            )),
            Some(current) if current.as_str() == text => Err(TelegramError::new(
                TelegramErrorCode::MessageNotModified,
                "Bad Request: message is not modified",
            )),
            Some(current) => {
                *current = text.to_string();
                Ok(())
            }
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> TelegramResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TelegramCall::Delete {
            chat_id,
            message_id,
        });
        if state.fail_deletes {
            return Err(TelegramError::new(
                TelegramErrorCode::MessageCantBeDeleted,
                "Bad Request: message can't be deleted",
            ));
        }
        match state.messages.remove(&(chat_id, message_id)) {
            Some(_) => Ok(()),
            None => Err(TelegramError::new(
                TelegramErrorCode::MessageNotFound,
                "Bad Request: message to delete not found",
            )),
        }
    }

    async fn set_message_reaction(
        &self,
        chat_id: i64,
        message_id: i64,
        emoji: Option<&str>,
    ) -> TelegramResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(TelegramCall::React {
            chat_id,
            message_id,
            emoji: emoji.map(str::to_string),
        });
        match emoji {
            Some(e) => state.reactions.insert((chat_id, message_id), e.to_string()),
            None => state.reactions.remove(&(chat_id, message_id)),
        };
        Ok(())
    }
}

// =============================================================================
// NOTION
// =============================================================================

/// A recorded Notion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotionCall {
    Query {
        database_id: String,
        filtered: bool,
    },
    Retrieve {
        page_id: String,
    },
    Create {
        database_id: String,
    },
    Update {
        page_id: String,
    },
    Archive {
        page_id: String,
    },
}

impl NotionCall {
    fn is_write(&self) -> bool {
        matches!(
            self,
            NotionCall::Create { .. } | NotionCall::Update { .. } | NotionCall::Archive { .. }
        )
    }
}

#[derive(Debug)]
struct NotionState {
    /// `(database_id, page)` in creation order.
    pages: Vec<(String, Page)>,
    next_page_id: u64,
    page_size: usize,
    calls: Vec<NotionCall>,
    failing_content: HashSet<String>,
}

impl Default for NotionState {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            next_page_id: 0,
            page_size: 100,
            calls: Vec::new(),
            failing_content: HashSet::new(),
        }
    }
}

/// Mock Notion workspace.
#[derive(Clone, Default)]
pub struct MockNotionApi {
    state: Arc<Mutex<NotionState>>,
    schema: NotionSchema,
}

/// Plain text of a stored title or rich_text property.
fn stored_text(property: Option<&Value>) -> String {
    property
        .and_then(|p| {
            let kind = p.get("type")?.as_str()?;
            p.get(kind)?.as_array().cloned()
        })
        .unwrap_or_default()
        .iter()
        .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
        .collect()
}

/// Shape written properties the way Notion returns them: with a `type`
/// tag and `plain_text` on every text segment.
fn echo_properties(properties: &Properties) -> Properties {
    properties
        .iter()
        .map(|(name, value)| {
            let mut value = value.clone();
            let kind = value
                .as_object()
                .and_then(|o| o.keys().find(|k| k.as_str() != "type").cloned());
            if let Some(kind) = kind {
                if let Some(segments) = value.get_mut(&kind).and_then(Value::as_array_mut) {
                    for segment in segments {
                        if let Some(text) = segment.pointer("/text/content").cloned() {
                            segment["plain_text"] = text;
                        }
                    }
                }
                value["type"] = json!(kind);
            }
            (name.clone(), value)
        })
        .collect()
}

impl MockNotionApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: NotionSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Smaller query pages, to exercise pagination.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.lock().unwrap().page_size = page_size.max(1);
        self
    }

    /// Writes whose title contains `needle` fail transiently.
    pub fn failing_writes_containing(self, needle: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_content
            .insert(needle.to_string());
        self
    }

    /// Seed a page written by a person, bypassing the call log.
    pub fn seed_note(&self, database_id: &str, note: &Note) -> String {
        let properties = note_properties(&self.schema, note).unwrap_or_default();
        self.seed_raw(database_id, properties)
    }

    /// Seed a page with arbitrary properties (possibly malformed).
    pub fn seed_raw(&self, database_id: &str, properties: Properties) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_page_id += 1;
        let id = format!("page-{}", state.next_page_id);
        let page = Page {
            id: id.clone(),
            archived: false,
            properties: echo_properties(&properties),
        };
        state.pages.push((database_id.to_string(), page));
        id
    }

    /// Edit a page property as a person would.
    pub fn set_property(&self, page_id: &str, name: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        if let Some((_, page)) = state.pages.iter_mut().find(|(_, p)| p.id == page_id) {
            let mut single = Properties::new();
            single.insert(name.to_string(), value);
            page.properties.extend(echo_properties(&single));
        }
    }

    pub fn page(&self, page_id: &str) -> Option<Page> {
        self.state
            .lock()
            .unwrap()
            .pages
            .iter()
            .find(|(_, p)| p.id == page_id)
            .map(|(_, p)| p.clone())
    }

    /// Live pages of a database.
    pub fn pages(&self, database_id: &str) -> Vec<Page> {
        self.state
            .lock()
            .unwrap()
            .pages
            .iter()
            .filter(|(db, p)| db == database_id && !p.archived)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Title text of a page.
    pub fn title(&self, page_id: &str) -> Option<String> {
        self.page(page_id)
            .map(|p| stored_text(p.properties.get(&self.schema.content)))
    }

    pub fn calls(&self) -> Vec<NotionCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn write_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_write()).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn check_failure(&self, state: &NotionState, properties: &Properties) -> Result<()> {
        let title = stored_text(echo_properties(properties).get(&self.schema.content));
        if state.failing_content.iter().any(|n| title.contains(n)) {
            return Err(Error::transient("Notion unavailable: injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl NotionApi for MockNotionApi {
    async fn query_database(
        &self,
        database_id: &str,
        filter: Option<Value>,
        start_cursor: Option<String>,
    ) -> Result<PageList> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(NotionCall::Query {
            database_id: database_id.to_string(),
            filtered: filter.is_some(),
        });

        let wanted = filter.as_ref().and_then(|f| {
            let property = f.get("property")?.as_str()?.to_string();
            let equals = f.pointer("/rich_text/equals")?.as_str()?.to_string();
            Some((property, equals))
        });
        let matching: Vec<Page> = state
            .pages
            .iter()
            .filter(|(db, _)| db == database_id)
            .filter(|(_, page)| match &wanted {
                Some((property, equals)) => {
                    stored_text(page.properties.get(property)) == *equals
                }
                None => true,
            })
            .map(|(_, page)| page.clone())
            .collect();

        let start: usize = start_cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (start + state.page_size).min(matching.len());
        let has_more = end < matching.len();
        Ok(PageList {
            results: matching[start.min(end)..end].to_vec(),
            has_more,
            next_cursor: has_more.then(|| end.to_string()),
        })
    }

    async fn retrieve_page(&self, page_id: &str) -> Result<Option<Page>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(NotionCall::Retrieve {
            page_id: page_id.to_string(),
        });
        Ok(state
            .pages
            .iter()
            .find(|(_, p)| p.id == page_id)
            .map(|(_, p)| p.clone()))
    }

    async fn create_page(&self, database_id: &str, properties: &Properties) -> Result<Page> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(NotionCall::Create {
            database_id: database_id.to_string(),
        });
        self.check_failure(&state, properties)?;
        state.next_page_id += 1;
        let page = Page {
            id: format!("page-{}", state.next_page_id),
            archived: false,
            properties: echo_properties(properties),
        };
        state.pages.push((database_id.to_string(), page.clone()));
        Ok(page)
    }

    async fn update_page(&self, page_id: &str, properties: &Properties) -> Result<Page> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(NotionCall::Update {
            page_id: page_id.to_string(),
        });
        self.check_failure(&state, properties)?;
        let (_, page) = state
            .pages
            .iter_mut()
            .find(|(_, p)| p.id == page_id)
            .ok_or_else(|| Error::NotFound(format!("Notion: page {}", page_id)))?;
        page.properties.extend(echo_properties(properties));
        Ok(page.clone())
    }

    async fn archive_page(&self, page_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(NotionCall::Archive {
            page_id: page_id.to_string(),
        });
        if let Some((_, page)) = state.pages.iter_mut().find(|(_, p)| p.id == page_id) {
            page.archived = true;
        }
        Ok(())
    }
}

// =============================================================================
// LEDGER AND FACTORY
// =============================================================================

/// In-memory chat message ledger.
#[derive(Clone, Default)]
pub struct MemoryChatLedger {
    records: Arc<Mutex<BTreeMap<(Uuid, i64), ChatMessageRecord>>>,
}

impl MemoryChatLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChatMessageLedger for MemoryChatLedger {
    async fn get(&self, bucket_id: Uuid, message_id: i64) -> Result<Option<ChatMessageRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(bucket_id, message_id))
            .cloned())
    }

    async fn list(&self, bucket_id: Uuid) -> Result<Vec<ChatMessageRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.bucket_id == bucket_id)
            .cloned()
            .collect())
    }

    async fn find_by_mirror(
        &self,
        bucket_id: Uuid,
        mirror_id: &str,
    ) -> Result<Option<ChatMessageRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .rev()
            .find(|r| {
                r.bucket_id == bucket_id
                    && r.mirror_vendor_entity.as_ref().map(|m| m.id.as_str()) == Some(mirror_id)
            })
            .cloned())
    }

    async fn put(&self, record: ChatMessageRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert((record.bucket_id, record.message_id), record);
        Ok(())
    }

    async fn remove(&self, bucket_id: Uuid, message_id: i64) -> Result<bool> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .remove(&(bucket_id, message_id))
            .is_some())
    }
}

/// Factory handing out fixed adapters per bucket type.
#[derive(Clone, Default)]
pub struct MockAdapterFactory {
    adapters: HashMap<BucketType, Arc<dyn BucketAdapter>>,
}

impl MockAdapterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(
        mut self,
        bucket_type: BucketType,
        adapter: Arc<dyn BucketAdapter>,
    ) -> Self {
        self.adapters.insert(bucket_type, adapter);
        self
    }
}

#[async_trait]
impl AdapterFactory for MockAdapterFactory {
    async fn adapter_for(&self, bucket: &Bucket) -> Result<Arc<dyn BucketAdapter>> {
        self.adapters
            .get(&bucket.bucket_type)
            .cloned()
            .ok_or_else(|| {
                Error::UnsupportedAction(format!("no adapter for {} buckets", bucket.bucket_type))
            })
    }
}
