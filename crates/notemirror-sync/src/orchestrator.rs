//! Note propagation between linked buckets.
//!
//! Two entry paths exist. Triggered sync reacts to a single change in a
//! mirror bucket (a note was created, edited, deleted or reacted to) and
//! pushes it to the source buckets linked to that mirror. Bulk
//! reconciliation walks every note of every source bucket linked to a mirror
//! and brings the mirror copies in line with the current link rules.
//!
//! Within a pass, notes are handled strictly one after another, and every
//! operation holds the [`BucketLocks`] slot of its mirror bucket, so a note
//! never has two mirror owners at once.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use notemirror_core::{
    hash, Bucket, Error, Link, LoadedBucket, MatchedLink, Note, NoteStatus, Result, SyncReport,
    TemplateCache, VendorEntity, VendorEntityQuery, VendorEntityType,
};

use crate::config::{InvalidResourcePolicy, SyncConfig};
use crate::deferred::DeferredTasks;
use crate::deps::SyncDeps;
use crate::locks::BucketLocks;
use crate::resolver::LinkResolver;

/// What reconciling one note did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Unchanged,
    Detached,
    Deleted,
}

fn tally(report: &mut SyncReport, outcome: Outcome) {
    match outcome {
        Outcome::Created => report.created += 1,
        Outcome::Updated => report.updated += 1,
        Outcome::Unchanged => report.unchanged += 1,
        Outcome::Detached => report.detached += 1,
        Outcome::Deleted => report.deleted += 1,
    }
}

/// A note that only identifies a record, for adapter deletes.
fn record_of(entity: &VendorEntity) -> Note {
    Note::default().with_source(entity.clone())
}

/// State shared by every note of one reconciliation pass.
struct PassContext {
    user_id: Uuid,
    mirror: LoadedBucket,
    links: Vec<Link>,
    templates: TemplateCache,
    /// Buckets looked up by backend id while moving mirrors; `None` once a
    /// bucket is known to be gone.
    others: HashMap<String, Option<LoadedBucket>>,
}

/// Routes note changes across linked buckets.
pub struct SyncOrchestrator {
    deps: SyncDeps,
    config: SyncConfig,
    resolver: LinkResolver,
    locks: BucketLocks,
    deferred: DeferredTasks,
}

impl SyncOrchestrator {
    pub fn new(deps: SyncDeps, config: SyncConfig) -> Self {
        Self {
            resolver: LinkResolver::new(deps.links.clone()),
            deps,
            config,
            locks: BucketLocks::new(),
            deferred: DeferredTasks::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn locks(&self) -> &BucketLocks {
        &self.locks
    }

    /// Background tasks scheduled by reaction handling.
    pub fn deferred(&self) -> &DeferredTasks {
        &self.deferred
    }

    // =========================================================================
    // BUCKET LOADING
    // =========================================================================

    async fn load(&self, bucket: Bucket) -> Result<LoadedBucket> {
        let adapter = self.deps.adapters.adapter_for(&bucket).await?;
        Ok(LoadedBucket { bucket, adapter })
    }

    async fn bucket_by_id(&self, user_id: Uuid, bucket_id: Uuid) -> Result<LoadedBucket> {
        let bucket = self
            .deps
            .buckets
            .get_bucket_by_id(user_id, bucket_id)
            .await?
            .ok_or(Error::BucketNotFound(bucket_id))?;
        self.load(bucket).await
    }

    async fn bucket_by_query(&self, user_id: Uuid, query_id: &str) -> Result<LoadedBucket> {
        let bucket = self
            .deps
            .buckets
            .get_bucket_by_query_id(user_id, query_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("bucket with query id {}", query_id)))?;
        self.load(bucket).await
    }

    async fn source_buckets(&self, user_id: Uuid, mirror_bucket_id: Uuid) -> Result<Vec<LoadedBucket>> {
        let buckets = self
            .deps
            .links
            .get_linked_source_buckets(user_id, mirror_bucket_id)
            .await?;
        let mut loaded = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            loaded.push(self.load(bucket).await?);
        }
        Ok(loaded)
    }

    // =========================================================================
    // TRIGGERED SYNC
    // =========================================================================

    /// A note appeared in a mirror bucket: create it in every source bucket
    /// whose link routes it.
    #[instrument(
        skip(self, note),
        fields(subsystem = "sync", component = "orchestrator", op = "note_created")
    )]
    pub async fn handle_mirror_note_created(
        &self,
        user_id: Uuid,
        note: Note,
        mirror_bucket_query: &str,
        mirror_ve_query: Option<VendorEntityQuery>,
    ) -> Result<SyncReport> {
        let query = mirror_query(&note, mirror_ve_query)?;
        let mirror = self.bucket_by_query(user_id, mirror_bucket_query).await?;
        let _guard = self.locks.acquire(user_id, mirror.id()).await;

        let entity = mirror_entity(&mirror, &note, &query)?;
        self.propagate_created(user_id, &mirror, &note, entity).await
    }

    /// A mirror note was edited: update the source notes pointing at it, or
    /// create them when none exist yet.
    #[instrument(
        skip(self, note),
        fields(subsystem = "sync", component = "orchestrator", op = "note_updated")
    )]
    pub async fn handle_mirror_note_updated(
        &self,
        user_id: Uuid,
        note: Note,
        mirror_bucket_query: &str,
        mirror_ve_query: Option<VendorEntityQuery>,
    ) -> Result<SyncReport> {
        let query = mirror_query(&note, mirror_ve_query)?;
        let mirror = self.bucket_by_query(user_id, mirror_bucket_query).await?;
        let _guard = self.locks.acquire(user_id, mirror.id()).await;

        let entity = mirror_entity(&mirror, &note, &query)?;
        let links = self.resolver.resolve(user_id, mirror.id()).await?;
        let routed = TemplateCache::new().route(&links, &note)?;

        let mut report = SyncReport::default();
        for source in self.source_buckets(user_id, mirror.id()).await? {
            let Some(existing) = source
                .adapter
                .find_by_mirror_query(&source.bucket, &query)
                .await?
            else {
                continue;
            };
            let tags = routed
                .iter()
                .find(|m| m.link.source_bucket_id == source.id())
                .map(|m| m.augmented_tags(&note))
                .unwrap_or_else(|| note.tags.clone());
            let updated = Note {
                content: note.content.clone(),
                tags,
                status: note.status,
                source_vendor_entity: existing.source_vendor_entity,
                mirror_vendor_entity: Some(entity.clone()),
            };
            source.adapter.upsert(&source.bucket, updated).await?;
            report.updated += 1;
        }

        if report.updated == 0 {
            debug!(
                subsystem = "sync",
                component = "orchestrator",
                op = "note_updated",
                vendor_entity_id = %query.id,
                "No source note references this mirror, creating instead"
            );
            return self.propagate_created(user_id, &mirror, &note, entity).await;
        }
        Ok(report)
    }

    /// A mirror note was deleted: delete every source note pointing at it.
    #[instrument(
        skip(self, note),
        fields(subsystem = "sync", component = "orchestrator", op = "note_deleted")
    )]
    pub async fn handle_mirror_note_deleted(
        &self,
        user_id: Uuid,
        note: Note,
        mirror_bucket_query: &str,
        mirror_ve_query: Option<VendorEntityQuery>,
    ) -> Result<SyncReport> {
        let query = mirror_query(&note, mirror_ve_query)?;
        let mirror = self.bucket_by_query(user_id, mirror_bucket_query).await?;
        let _guard = self.locks.acquire(user_id, mirror.id()).await;

        let mut report = SyncReport::default();
        for source in self.source_buckets(user_id, mirror.id()).await? {
            if let Some(existing) = source
                .adapter
                .find_by_mirror_query(&source.bucket, &query)
                .await?
            {
                source.adapter.delete(&source.bucket, &existing).await?;
                report.deleted += 1;
                info!(
                    subsystem = "sync",
                    component = "orchestrator",
                    op = "note_deleted",
                    bucket_id = %source.id(),
                    vendor_entity_id = %query.id,
                    "Source note deleted with its mirror"
                );
            }
        }
        Ok(report)
    }

    /// A reaction was placed on a mirror note. Mapped reactions set the
    /// status of the linked source notes; the reaction itself is cleared
    /// from the mirror after [`SyncConfig::reaction_clear_delay`].
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "orchestrator", op = "reaction")
    )]
    pub async fn handle_mirror_reaction(
        &self,
        user_id: Uuid,
        mirror_bucket_query: &str,
        mirror_ve_query: VendorEntityQuery,
        emoji: &str,
    ) -> Result<SyncReport> {
        let Some(status) = self.config.status_for_reaction(emoji) else {
            debug!(
                subsystem = "sync",
                component = "orchestrator",
                op = "reaction",
                emoji,
                "Reaction has no status mapping, ignoring"
            );
            return Ok(SyncReport::default());
        };

        let mirror = self.bucket_by_query(user_id, mirror_bucket_query).await?;
        let _guard = self.locks.acquire(user_id, mirror.id()).await;

        let mut report = SyncReport::default();
        for source in self.source_buckets(user_id, mirror.id()).await? {
            let Some(existing) = source
                .adapter
                .find_by_mirror_query(&source.bucket, &mirror_ve_query)
                .await?
            else {
                continue;
            };
            if existing.status == status {
                report.unchanged += 1;
                continue;
            }
            source
                .adapter
                .upsert(&source.bucket, existing.with_status(status))
                .await?;
            report.updated += 1;
        }

        info!(
            subsystem = "sync",
            component = "orchestrator",
            op = "reaction",
            vendor_entity_id = %mirror_ve_query.id,
            %status,
            updated = report.updated,
            "Reaction applied"
        );

        let adapter = mirror.adapter.clone();
        let bucket = mirror.bucket.clone();
        self.deferred.schedule(
            "clear_reaction",
            self.config.reaction_clear_delay(),
            async move { adapter.clear_reaction(&bucket, &mirror_ve_query).await },
        );
        Ok(report)
    }

    async fn propagate_created(
        &self,
        user_id: Uuid,
        mirror: &LoadedBucket,
        note: &Note,
        entity: VendorEntity,
    ) -> Result<SyncReport> {
        let links = self.resolver.resolve(user_id, mirror.id()).await?;
        let routed = TemplateCache::new().route(&links, note)?;
        if routed.is_empty() {
            debug!(
                subsystem = "sync",
                component = "orchestrator",
                op = "note_created",
                vendor_entity_id = %entity.id,
                link_count = links.len(),
                "No link routes this note"
            );
        }

        let mut report = SyncReport::default();
        let mut targeted = HashSet::new();
        for matched in &routed {
            // Several templates may route to one source; the highest priority wins
            if !targeted.insert(matched.link.source_bucket_id) {
                continue;
            }
            let source = self
                .bucket_by_id(user_id, matched.link.source_bucket_id)
                .await?;
            let copy = Note {
                content: note.content.clone(),
                tags: matched.augmented_tags(note),
                status: note.status,
                source_vendor_entity: None,
                mirror_vendor_entity: Some(entity.clone()),
            };
            let written = source.adapter.upsert(&source.bucket, copy).await?;
            report.created += 1;
            info!(
                subsystem = "sync",
                component = "orchestrator",
                op = "note_created",
                link_id = %matched.link.id,
                bucket_id = %source.id(),
                vendor_entity_id = written.source_vendor_entity.as_ref().map(|e| e.id.as_str()).unwrap_or_default(),
                "Mirror note created in source bucket"
            );
        }
        Ok(report)
    }

    // =========================================================================
    // BULK RECONCILIATION
    // =========================================================================

    /// Reconcile every source bucket linked to `mirror_bucket_id`
    /// (`sync_notes`).
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "orchestrator", op = "bulk_sync")
    )]
    pub async fn trigger_bulk_sync(&self, user_id: Uuid, mirror_bucket_id: Uuid) -> Result<SyncReport> {
        let start = Instant::now();
        let _guard = self.locks.acquire(user_id, mirror_bucket_id).await;
        let result = self.sync_notes(user_id, mirror_bucket_id).await;
        log_pass("bulk_sync", mirror_bucket_id, start, &result);
        result
    }

    /// Reconcile one source bucket against `mirror_bucket_id`.
    #[instrument(
        skip(self),
        fields(subsystem = "sync", component = "orchestrator", op = "source_sync")
    )]
    pub async fn sync_source_notes(
        &self,
        user_id: Uuid,
        mirror_bucket_id: Uuid,
        source_bucket_id: Uuid,
    ) -> Result<SyncReport> {
        let start = Instant::now();
        let _guard = self.locks.acquire(user_id, mirror_bucket_id).await;
        let result = async {
            let mut ctx = self.prepare_pass(user_id, mirror_bucket_id).await?;
            let source = self.bucket_by_id(user_id, source_bucket_id).await?;
            self.reconcile_source(&mut ctx, &source).await
        }
        .await;
        log_pass("source_sync", mirror_bucket_id, start, &result);
        result
    }

    async fn sync_notes(&self, user_id: Uuid, mirror_bucket_id: Uuid) -> Result<SyncReport> {
        let mut ctx = self.prepare_pass(user_id, mirror_bucket_id).await?;
        let sources = self.source_buckets(user_id, mirror_bucket_id).await?;

        let mut report = SyncReport::default();
        for source in &sources {
            report += self.reconcile_source(&mut ctx, source).await?;
        }
        Ok(report)
    }

    async fn prepare_pass(&self, user_id: Uuid, mirror_bucket_id: Uuid) -> Result<PassContext> {
        let mirror = self.bucket_by_id(user_id, mirror_bucket_id).await?;
        let links = self.resolver.resolve(user_id, mirror_bucket_id).await?;
        Ok(PassContext {
            user_id,
            mirror,
            links,
            templates: TemplateCache::new(),
            others: HashMap::new(),
        })
    }

    async fn reconcile_source(
        &self,
        ctx: &mut PassContext,
        source: &LoadedBucket,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let notes = match source.adapter.scan(&source.bucket).await {
            Ok(notes) => notes,
            Err(e) if e.is_transient() => {
                warn!(
                    subsystem = "sync",
                    component = "orchestrator",
                    op = "scan",
                    bucket_id = %source.id(),
                    error = %e,
                    "Source bucket unavailable, skipping it this pass"
                );
                report.failed += 1;
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        report.scanned = notes.len();
        debug!(
            subsystem = "sync",
            component = "orchestrator",
            op = "scan",
            bucket_id = %source.id(),
            note_count = notes.len(),
            "Source bucket read"
        );

        for item in notes {
            let outcome = match item {
                Ok(note) => self.reconcile_note(ctx, source, note).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(outcome) => tally(&mut report, outcome),
                Err(e) => self.isolate(e, source, &mut report)?,
            }
        }
        Ok(report)
    }

    /// Decide whether a per-note failure ends the pass.
    fn isolate(&self, e: Error, source: &LoadedBucket, report: &mut SyncReport) -> Result<()> {
        if e.is_transient() {
            warn!(
                subsystem = "sync",
                component = "orchestrator",
                op = "reconcile",
                bucket_id = %source.id(),
                error = %e,
                "Note failed transiently, continuing"
            );
            report.failed += 1;
            return Ok(());
        }
        match (&e, self.config.invalid_resource_policy) {
            (Error::InvalidResource(_), InvalidResourcePolicy::Skip) => {
                warn!(
                    subsystem = "sync",
                    component = "orchestrator",
                    op = "reconcile",
                    bucket_id = %source.id(),
                    error = %e,
                    "Skipping malformed note"
                );
                report.skipped += 1;
                Ok(())
            }
            _ => Err(e),
        }
    }

    async fn reconcile_note(
        &self,
        ctx: &mut PassContext,
        source: &LoadedBucket,
        note: Note,
    ) -> Result<Outcome> {
        let source_entity = note.source_vendor_entity.clone().ok_or_else(|| {
            Error::InvalidResource(format!(
                "note read from bucket {} has no source entity",
                source.id()
            ))
        })?;

        if note.status == NoteStatus::ToDelete {
            return self.purge(ctx, source, &note).await;
        }

        let routed = ctx.templates.route(&ctx.links, &note)?;
        if let Some(matched) = routed
            .iter()
            .find(|m| m.link.source_bucket_id == source.id())
        {
            return self
                .mirror_note(ctx, source, &note, source_entity, matched)
                .await;
        }

        // No rule of this source routes the note any more
        match note
            .mirror_vendor_entity
            .as_ref()
            .filter(|e| ctx.mirror.holds(e))
        {
            Some(mirror) => {
                source
                    .adapter
                    .detach(&source.bucket, &source_entity.query())
                    .await?;
                ctx.mirror
                    .adapter
                    .detach(&ctx.mirror.bucket, &mirror.query())
                    .await?;
                info!(
                    subsystem = "sync",
                    component = "orchestrator",
                    op = "detach",
                    bucket_id = %source.id(),
                    vendor_entity_id = %source_entity.id,
                    "Note no longer routed, detached from mirror"
                );
                Ok(Outcome::Detached)
            }
            None => Ok(Outcome::Unchanged),
        }
    }

    /// Delete a `to_delete` note together with its mirror copy in this pass's
    /// mirror bucket.
    async fn purge(&self, ctx: &PassContext, source: &LoadedBucket, note: &Note) -> Result<Outcome> {
        if let Some(mirror) = note
            .mirror_vendor_entity
            .as_ref()
            .filter(|e| ctx.mirror.holds(e))
        {
            ctx.mirror
                .adapter
                .delete(&ctx.mirror.bucket, &record_of(mirror))
                .await?;
        }
        source.adapter.delete(&source.bucket, note).await?;
        info!(
            subsystem = "sync",
            component = "orchestrator",
            op = "purge",
            bucket_id = %source.id(),
            vendor_entity_id = note.source_vendor_entity.as_ref().map(|e| e.id.as_str()).unwrap_or_default(),
            "Note marked for deletion purged"
        );
        Ok(Outcome::Deleted)
    }

    async fn mirror_note(
        &self,
        ctx: &mut PassContext,
        source: &LoadedBucket,
        note: &Note,
        source_entity: VendorEntity,
        matched: &MatchedLink,
    ) -> Result<Outcome> {
        let mut current = note.mirror_vendor_entity.clone();
        if let Some(stale) = current.as_ref().filter(|e| !ctx.mirror.holds(e)) {
            self.remove_stale_mirror(ctx, stale).await?;
            current = None;
        }

        let copy = Note {
            content: note.content.clone(),
            tags: matched.augmented_tags(note),
            status: note.status,
            source_vendor_entity: current.clone(),
            mirror_vendor_entity: Some(source_entity),
        };
        let written = ctx.mirror.adapter.upsert(&ctx.mirror.bucket, copy).await?;
        let entity = written.source_vendor_entity.ok_or_else(|| {
            Error::Internal(format!(
                "adapter for bucket {} returned no entity",
                ctx.mirror.id()
            ))
        })?;

        let outcome = match &current {
            None => Outcome::Created,
            Some(previous) if !previous.same_as(&entity) => Outcome::Updated,
            Some(_) => Outcome::Unchanged,
        };

        let stored_is_current = note
            .mirror_vendor_entity
            .as_ref()
            .is_some_and(|stored| stored.same_as(&entity));
        if !stored_is_current {
            debug!(
                subsystem = "sync",
                component = "orchestrator",
                op = "write_back",
                link_id = %matched.link.id,
                bucket_id = %source.id(),
                vendor_entity_id = %entity.id,
                "Recording mirror entity on source note"
            );
            let pointed = Note {
                mirror_vendor_entity: Some(entity),
                ..note.clone()
            };
            source.adapter.upsert(&source.bucket, pointed).await?;
        }
        Ok(outcome)
    }

    /// Delete a mirror copy living in a bucket other than this pass's mirror.
    async fn remove_stale_mirror(&self, ctx: &mut PassContext, stale: &VendorEntity) -> Result<()> {
        let query_id = stale.bucket_query_id();
        let holder = match ctx.others.get(&query_id) {
            Some(cached) => cached.clone(),
            None => {
                let found = match self
                    .deps
                    .buckets
                    .get_bucket_by_query_id(ctx.user_id, &query_id)
                    .await?
                {
                    Some(bucket) => Some(self.load(bucket).await?),
                    None => None,
                };
                ctx.others.insert(query_id.clone(), found.clone());
                found
            }
        };

        match holder.filter(|b| b.holds(stale)) {
            Some(holder) => {
                holder.adapter.delete(&holder.bucket, &record_of(stale)).await?;
                info!(
                    subsystem = "sync",
                    component = "orchestrator",
                    op = "ownership_transfer",
                    bucket_id = %holder.id(),
                    mirror_bucket_id = %ctx.mirror.id(),
                    vendor_entity_id = %stale.id,
                    "Mirror moved to another bucket"
                );
            }
            None => debug!(
                subsystem = "sync",
                component = "orchestrator",
                op = "ownership_transfer",
                vendor_entity_id = %stale.id,
                "Previous mirror bucket is gone, dropping the reference"
            ),
        }
        Ok(())
    }
}

/// The mirror entity a trigger refers to: the explicit query, or the note's
/// own source entity.
fn mirror_query(note: &Note, explicit: Option<VendorEntityQuery>) -> Result<VendorEntityQuery> {
    explicit
        .or_else(|| note.source_vendor_entity.as_ref().map(VendorEntity::query))
        .ok_or_else(|| {
            Error::InvalidResource("mirror note carries no vendor entity to sync from".into())
        })
}

/// Full entity for a mirror-side query, reusing the note's own entity when
/// it is the same record.
fn mirror_entity(
    mirror: &LoadedBucket,
    note: &Note,
    query: &VendorEntityQuery,
) -> Result<VendorEntity> {
    if query.vendor_entity_type != mirror.adapter.vendor_entity_type() {
        return Err(Error::UnsupportedAction(format!(
            "{} entity cannot live in {} bucket {}",
            query.vendor_entity_type,
            mirror.bucket.bucket_type,
            mirror.id()
        )));
    }
    if let Some(own) = note
        .source_vendor_entity
        .as_ref()
        .filter(|e| e.query() == *query)
    {
        return Ok(own.clone());
    }
    let content_hash = hash(&note.content);
    match query.vendor_entity_type {
        VendorEntityType::ChatMessage => {
            let (chat_id, message_id) = query.chat_coordinates()?;
            Ok(VendorEntity::chat_message(chat_id, message_id, content_hash))
        }
        VendorEntityType::StructuredPage => Ok(VendorEntity::structured_page(
            mirror.bucket.query_id.clone(),
            query.id.clone(),
            content_hash,
        )),
    }
}

fn log_pass(op: &'static str, mirror_bucket_id: Uuid, start: Instant, result: &Result<SyncReport>) {
    let duration_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(report) => info!(
            subsystem = "sync",
            component = "orchestrator",
            op,
            %mirror_bucket_id,
            scanned = report.scanned,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            detached = report.detached,
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.failed,
            duration_ms,
            "Reconciliation pass completed"
        ),
        Err(e) => error!(
            subsystem = "sync",
            component = "orchestrator",
            op,
            %mirror_bucket_id,
            error = %e,
            duration_ms,
            "Reconciliation pass failed"
        ),
    }
}
