//! Chat-stream bucket adapter backed by the Telegram Bot API.
//!
//! A chat cannot be scanned or annotated after the fact, so every message
//! the adapter knows about is mirrored into the [`ChatMessageLedger`]. Reads
//! come from the ledger; writes go to Telegram first, then the ledger.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use notemirror_core::{
    extract_hashtags, hash, render_with_tags, Bucket, BucketAdapter, ChatMessageLedger,
    ChatMessageRecord, Error, Note, NoteStatus, Result, VendorEntity, VendorEntityQuery,
    VendorEntityType,
};

use super::client::TelegramApi;
use super::error::TelegramErrorCode;

/// Parse an inbound chat message into a note. Tags are its inline hashtags.
pub fn note_from_message(chat_id: i64, message_id: i64, text: &str) -> Note {
    let content = text.trim().to_string();
    let tags = extract_hashtags(&content);
    let entity = VendorEntity::chat_message(chat_id, message_id, hash(&content));
    Note {
        content,
        tags,
        source_vendor_entity: Some(entity),
        mirror_vendor_entity: None,
        status: NoteStatus::NotStarted,
    }
}

fn note_from_record(record: ChatMessageRecord) -> Note {
    Note {
        source_vendor_entity: Some(VendorEntity::chat_message(
            record.chat_id,
            record.message_id,
            record.hash,
        )),
        content: record.content,
        tags: record.tags.into_iter().collect(),
        mirror_vendor_entity: record.mirror_vendor_entity,
        status: record.status,
    }
}

fn chat_id(bucket: &Bucket) -> Result<i64> {
    bucket.query_id.trim().parse().map_err(|_| {
        Error::InvalidResource(format!(
            "bucket {} has non-numeric chat id '{}'",
            bucket.id, bucket.query_id
        ))
    })
}

/// Bucket adapter for a Telegram chat.
pub struct TelegramChatAdapter {
    api: Arc<dyn TelegramApi>,
    ledger: Arc<dyn ChatMessageLedger>,
}

impl TelegramChatAdapter {
    pub fn new(api: Arc<dyn TelegramApi>, ledger: Arc<dyn ChatMessageLedger>) -> Self {
        Self { api, ledger }
    }

    /// Record a message the bot received and return it as a note.
    ///
    /// An already-known message keeps its mirror pointer and status.
    pub async fn ingest_message(
        &self,
        bucket: &Bucket,
        message_id: i64,
        text: &str,
    ) -> Result<Note> {
        let chat_id = chat_id(bucket)?;
        let mut note = note_from_message(chat_id, message_id, text);
        if let Some(known) = self.ledger.get(bucket.id, message_id).await? {
            note.mirror_vendor_entity = known.mirror_vendor_entity;
            note.status = known.status;
        }
        self.record(bucket, chat_id, message_id, &note).await?;
        Ok(note)
    }

    /// Put the bot's reaction on a message.
    pub async fn set_reaction(
        &self,
        bucket: &Bucket,
        query: &VendorEntityQuery,
        emoji: &str,
    ) -> Result<()> {
        let (chat_id, message_id) = self.coordinates_in(bucket, query)?;
        self.api
            .set_message_reaction(chat_id, message_id, Some(emoji))
            .await?;
        Ok(())
    }

    fn coordinates_in(&self, bucket: &Bucket, query: &VendorEntityQuery) -> Result<(i64, i64)> {
        let (chat_id, message_id) = query.chat_coordinates()?;
        if chat_id.to_string() != bucket.query_id.trim() {
            return Err(Error::InvalidResource(format!(
                "message {} does not belong to chat {}",
                query.id, bucket.query_id
            )));
        }
        Ok((chat_id, message_id))
    }

    async fn record(
        &self,
        bucket: &Bucket,
        chat_id: i64,
        message_id: i64,
        note: &Note,
    ) -> Result<()> {
        self.ledger
            .put(ChatMessageRecord {
                bucket_id: bucket.id,
                chat_id,
                message_id,
                content: note.content.clone(),
                tags: note.tags.iter().cloned().collect(),
                hash: hash(&note.content),
                status: note.status,
                mirror_vendor_entity: note.mirror_vendor_entity.clone(),
                updated_at_utc: Utc::now(),
            })
            .await
    }

    /// Bring an existing message up to date. Returns the id of the message
    /// that now carries the note, which differs from `message_id` when the
    /// edit had to be replaced by a new message.
    async fn update_message(
        &self,
        bucket: &Bucket,
        chat_id: i64,
        message_id: i64,
        note: &Note,
    ) -> Result<i64> {
        let content_hash = hash(&note.content);
        let tags: Vec<String> = note.tags.iter().cloned().collect();

        if let Some(stored) = self.ledger.get(bucket.id, message_id).await? {
            if stored.hash == content_hash && stored.tags == tags {
                // Rendered text is identical; only local state may need a refresh
                if stored.status != note.status
                    || stored.mirror_vendor_entity != note.mirror_vendor_entity
                {
                    self.record(bucket, chat_id, message_id, note).await?;
                }
                debug!(
                    subsystem = "vendors",
                    component = "telegram",
                    op = "upsert",
                    chat_id,
                    message_id,
                    "Message unchanged, skipping edit"
                );
                return Ok(message_id);
            }
        }

        let text = render_with_tags(&note.content, &note.tags);
        match self.api.edit_message_text(chat_id, message_id, &text).await {
            Ok(()) => {}
            // Text already matches; only the stored hash is stale
            Err(e) if e.code == TelegramErrorCode::MessageNotModified => {}
            Err(e)
                if matches!(
                    e.code,
                    TelegramErrorCode::MessageCantBeEdited | TelegramErrorCode::MessageNotFound
                ) =>
            {
                let sent = self.api.send_message(chat_id, &text).await?;
                if e.code == TelegramErrorCode::MessageNotFound {
                    info!(
                        subsystem = "vendors",
                        component = "telegram",
                        op = "upsert",
                        chat_id,
                        old_message_id = message_id,
                        new_message_id = sent.message_id,
                        "Message gone from chat, sent it again"
                    );
                } else {
                    info!(
                        subsystem = "vendors",
                        component = "telegram",
                        op = "upsert",
                        chat_id,
                        old_message_id = message_id,
                        new_message_id = sent.message_id,
                        "Edit refused, replaced message"
                    );
                    if let Err(delete_err) = self.api.delete_message(chat_id, message_id).await {
                        warn!(
                            subsystem = "vendors",
                            component = "telegram",
                            op = "upsert",
                            chat_id,
                            message_id,
                            error = %delete_err,
                            "Failed to delete replaced message"
                        );
                    }
                }
                self.ledger.remove(bucket.id, message_id).await?;
                self.record(bucket, chat_id, sent.message_id, note).await?;
                return Ok(sent.message_id);
            }
            Err(e) => return Err(e.into()),
        }

        self.record(bucket, chat_id, message_id, note).await?;
        Ok(message_id)
    }
}

#[async_trait]
impl BucketAdapter for TelegramChatAdapter {
    fn vendor_entity_type(&self) -> VendorEntityType {
        VendorEntityType::ChatMessage
    }

    async fn read_all(&self, bucket: &Bucket) -> Result<Vec<Note>> {
        let records = self.ledger.list(bucket.id).await?;
        Ok(records.into_iter().map(note_from_record).collect())
    }

    async fn find_by_mirror_query(
        &self,
        bucket: &Bucket,
        query: &VendorEntityQuery,
    ) -> Result<Option<Note>> {
        Ok(self
            .ledger
            .find_by_mirror(bucket.id, &query.id)
            .await?
            .map(note_from_record))
    }

    async fn upsert(&self, bucket: &Bucket, note: Note) -> Result<Note> {
        let chat_id = chat_id(bucket)?;
        let existing = note
            .source_vendor_entity
            .as_ref()
            .and_then(VendorEntity::chat_coordinates)
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, message_id)| message_id);

        let message_id = match existing {
            Some(message_id) => self.update_message(bucket, chat_id, message_id, &note).await?,
            None => {
                let text = render_with_tags(&note.content, &note.tags);
                let sent = self.api.send_message(chat_id, &text).await?;
                debug!(
                    subsystem = "vendors",
                    component = "telegram",
                    op = "upsert",
                    chat_id,
                    message_id = sent.message_id,
                    "Message sent"
                );
                self.record(bucket, chat_id, sent.message_id, &note).await?;
                sent.message_id
            }
        };

        let entity = VendorEntity::chat_message(chat_id, message_id, hash(&note.content));
        Ok(Note {
            source_vendor_entity: Some(entity),
            ..note
        })
    }

    async fn delete(&self, bucket: &Bucket, note: &Note) -> Result<()> {
        let Some((chat_id, message_id)) = note
            .source_vendor_entity
            .as_ref()
            .and_then(VendorEntity::chat_coordinates)
        else {
            return Ok(());
        };

        match self.api.delete_message(chat_id, message_id).await {
            Ok(()) => {}
            Err(e) if e.code == TelegramErrorCode::MessageNotFound => {
                debug!(
                    subsystem = "vendors",
                    component = "telegram",
                    op = "delete",
                    chat_id,
                    message_id,
                    "Message already gone"
                );
            }
            Err(e) if e.code == TelegramErrorCode::MessageCantBeDeleted => {
                warn!(
                    subsystem = "vendors",
                    component = "telegram",
                    op = "delete",
                    chat_id,
                    message_id,
                    error = %e,
                    "Message cannot be deleted, forgetting it"
                );
            }
            Err(e) => return Err(e.into()),
        }

        self.ledger.remove(bucket.id, message_id).await?;
        Ok(())
    }

    async fn detach(&self, bucket: &Bucket, query: &VendorEntityQuery) -> Result<()> {
        let record = match query.vendor_entity_type {
            VendorEntityType::ChatMessage => {
                let (_, message_id) = query.chat_coordinates()?;
                self.ledger.get(bucket.id, message_id).await?
            }
            // A foreign query names the mirror, not the message
            _ => self.ledger.find_by_mirror(bucket.id, &query.id).await?,
        };

        if let Some(mut record) = record.filter(|r| r.mirror_vendor_entity.is_some()) {
            record.mirror_vendor_entity = None;
            record.updated_at_utc = Utc::now();
            self.ledger.put(record).await?;
        }
        Ok(())
    }

    async fn clear_reaction(&self, bucket: &Bucket, query: &VendorEntityQuery) -> Result<()> {
        let (chat_id, message_id) = self.coordinates_in(bucket, query)?;
        match self.api.set_message_reaction(chat_id, message_id, None).await {
            Ok(()) => Ok(()),
            Err(e) if e.code == TelegramErrorCode::MessageNotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
