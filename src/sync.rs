//! The sync engine: pulls every record out of the remote source, flattens
//! them into topic rows written in fixed-size batches, then mirrors each
//! record's nested block content.
//!
//! Failure policy is best-effort: a malformed pagination response
//! aborts the run (the cursor chain cannot be trusted past it), while a
//! rejected batch or a single record's content failure is counted into the
//! [`SyncSummary`] and the run continues. Per phase,
//! `attempted == succeeded + failed` always holds.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::SyncError;
use crate::extract::flatten_record;
use crate::model::{PageContent, PhaseCounts, SyncSummary, TopicRow};
use crate::notion::{collect_blocks, collect_records, RecordSource};

/// Destination store seam. The production implementation is
/// [`SqliteStore`](crate::db::SqliteStore); tests script failures through a
/// recording double.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Write one batch of topic rows. The whole batch succeeds or fails as
    /// a unit from the engine's point of view.
    async fn insert_topics(&self, rows: &[TopicRow]) -> anyhow::Result<()>;

    /// Replace the stored content for `content.source_id` wholesale.
    async fn upsert_content(&self, content: &PageContent) -> anyhow::Result<()>;
}

/// Engine tuning, taken from [`SyncSettings`](crate::config::SyncSettings).
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub page_size: u32,
    pub batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            batch_size: 25,
        }
    }
}

/// Run a full two-phase sync and report the per-phase accounting.
///
/// Phase 1 flattens every record and writes rows in `batch_size` batches;
/// phase 2 walks each record's block children and upserts them keyed by the
/// record id. Only a pagination protocol or transport failure during the
/// record walk aborts the run.
#[instrument(skip_all)]
pub async fn run_full_sync(
    source: &dyn RecordSource,
    store: &dyn SyncStore,
    opts: SyncOptions,
) -> Result<SyncSummary, SyncError> {
    let records = collect_records(source, opts.page_size).await?;
    info!(records = records.len(), "fetched records from source");

    let mut summary = SyncSummary::default();
    sync_topic_rows(store, &records, opts.batch_size, &mut summary.topics).await;
    sync_page_content(source, store, &records, &mut summary.content).await;

    info!(
        topics_attempted = summary.topics.attempted,
        topics_succeeded = summary.topics.succeeded,
        topics_failed = summary.topics.failed,
        content_attempted = summary.content.attempted,
        content_succeeded = summary.content.succeeded,
        content_failed = summary.content.failed,
        "full sync complete"
    );
    Ok(summary)
}

/// Phase 1: flatten and write topic rows in fixed-size batches.
async fn sync_topic_rows(
    store: &dyn SyncStore,
    records: &[Value],
    batch_size: usize,
    counts: &mut PhaseCounts,
) {
    let mut buffer: Vec<TopicRow> = Vec::with_capacity(batch_size);
    for record in records {
        buffer.push(flatten_record(record));
        if buffer.len() >= batch_size {
            flush_batch(store, &mut buffer, counts).await;
        }
    }
    if !buffer.is_empty() {
        flush_batch(store, &mut buffer, counts).await;
    }
    info!(
        synced = counts.succeeded,
        failed = counts.failed,
        "topic row phase complete"
    );
}

/// Submit the buffered rows as one write, fold the outcome into the
/// counters, and clear the buffer.
async fn flush_batch(store: &dyn SyncStore, buffer: &mut Vec<TopicRow>, counts: &mut PhaseCounts) {
    let rows = buffer.len();
    match store.insert_topics(buffer).await {
        Ok(()) => counts.ok(rows),
        Err(source) => {
            let err = SyncError::BatchWrite { rows, source };
            warn!(?err, rows, "topic batch rejected; continuing");
            counts.err(rows);
        }
    }
    buffer.clear();
}

/// Phase 2: per-record block fetch and upsert. One record's failure is
/// isolated; later records still run. Sequential by design.
async fn sync_page_content(
    source: &dyn RecordSource,
    store: &dyn SyncStore,
    records: &[Value],
    counts: &mut PhaseCounts,
) {
    let total = records.len();
    for (idx, record) in records.iter().enumerate() {
        let source_id = record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match sync_record_content(source, store, &source_id).await {
            Ok(()) => counts.ok(1),
            Err(err) => {
                warn!(?err, source_id, "content sync failed; continuing");
                counts.err(1);
            }
        }
        if (idx + 1) % 10 == 0 {
            info!(processed = idx + 1, total, "content sync progress");
        }
    }
    info!(
        synced = counts.succeeded,
        failed = counts.failed,
        "page content phase complete"
    );
}

async fn sync_record_content(
    source: &dyn RecordSource,
    store: &dyn SyncStore,
    source_id: &str,
) -> Result<(), SyncError> {
    let blocks = collect_blocks(source, source_id)
        .await
        .map_err(|err| SyncError::RecordSync {
            source_id: source_id.to_string(),
            source: anyhow::Error::new(err),
        })?;
    store
        .upsert_content(&PageContent::new(source_id, blocks))
        .await
        .map_err(|source| SyncError::RecordSync {
            source_id: source_id.to_string(),
            source,
        })
}
