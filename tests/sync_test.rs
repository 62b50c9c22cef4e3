use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use studyhub::error::SyncError;
use studyhub::model::{PageContent, TopicRow};
use studyhub::notion::{collect_records, RecordPage, RecordSource};
use studyhub::sync::{run_full_sync, SyncOptions, SyncStore};

fn record(id: &str) -> Value {
    json!({
        "id": id,
        "properties": {
            "Topic Name": { "title": [ { "plain_text": format!("Topic {id}") } ] },
            "Completed": { "select": { "name": "True" } }
        }
    })
}

fn page(ids: &[&str], next_cursor: Option<&str>) -> RecordPage {
    RecordPage {
        results: ids.iter().map(|id| record(id)).collect(),
        has_more: next_cursor.is_some(),
        next_cursor: next_cursor.map(str::to_string),
    }
}

/// Scripted remote source: record pages are served in order; block pages
/// are served per record id, defaulting to a single empty page.
#[derive(Default)]
struct ScriptedSource {
    record_pages: Arc<Mutex<Vec<Result<RecordPage, SyncError>>>>,
    cursors_seen: Arc<Mutex<Vec<Option<String>>>>,
    block_pages: Arc<Mutex<HashMap<String, Vec<RecordPage>>>>,
    failing_blocks: HashSet<String>,
}

impl ScriptedSource {
    fn with_pages(pages: Vec<RecordPage>) -> Self {
        Self {
            record_pages: Arc::new(Mutex::new(pages.into_iter().map(Ok).collect())),
            ..Default::default()
        }
    }

    fn with_outcomes(pages: Vec<Result<RecordPage, SyncError>>) -> Self {
        Self {
            record_pages: Arc::new(Mutex::new(pages)),
            ..Default::default()
        }
    }

    async fn script_blocks(&self, record_id: &str, pages: Vec<RecordPage>) {
        self.block_pages
            .lock()
            .await
            .insert(record_id.to_string(), pages);
    }
}

#[async_trait::async_trait]
impl RecordSource for ScriptedSource {
    async fn query_page(
        &self,
        _page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, SyncError> {
        self.cursors_seen
            .lock()
            .await
            .push(cursor.map(str::to_string));
        let mut pages = self.record_pages.lock().await;
        if pages.is_empty() {
            return Ok(RecordPage {
                results: vec![],
                has_more: false,
                next_cursor: None,
            });
        }
        pages.remove(0)
    }

    async fn blocks_page(
        &self,
        record_id: &str,
        _cursor: Option<&str>,
    ) -> Result<RecordPage, SyncError> {
        if self.failing_blocks.contains(record_id) {
            return Err(SyncError::Transport(anyhow!("block fetch refused")));
        }
        let mut scripted = self.block_pages.lock().await;
        if let Some(pages) = scripted.get_mut(record_id) {
            if !pages.is_empty() {
                return Ok(pages.remove(0));
            }
        }
        Ok(RecordPage {
            results: vec![],
            has_more: false,
            next_cursor: None,
        })
    }
}

/// Recording destination store; batch calls can be scripted to fail by
/// 1-based call index, content upserts by record id.
#[derive(Default)]
struct RecordingStore {
    batch_sizes: Arc<Mutex<Vec<usize>>>,
    rows: Arc<Mutex<Vec<TopicRow>>>,
    failing_batches: HashSet<usize>,
    content: Arc<Mutex<Vec<PageContent>>>,
    failing_content: HashSet<String>,
}

impl RecordingStore {
    fn failing_batch_calls(indices: &[usize]) -> Self {
        Self {
            failing_batches: indices.iter().copied().collect(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl SyncStore for RecordingStore {
    async fn insert_topics(&self, rows: &[TopicRow]) -> anyhow::Result<()> {
        let mut sizes = self.batch_sizes.lock().await;
        sizes.push(rows.len());
        if self.failing_batches.contains(&sizes.len()) {
            return Err(anyhow!("batch rejected"));
        }
        self.rows.lock().await.extend(rows.iter().cloned());
        Ok(())
    }

    async fn upsert_content(&self, content: &PageContent) -> anyhow::Result<()> {
        if self.failing_content.contains(&content.source_id) {
            return Err(anyhow!("content rejected"));
        }
        self.content.lock().await.push(content.clone());
        Ok(())
    }
}

#[tokio::test]
async fn pagination_walk_preserves_order_without_duplication() {
    let source = ScriptedSource::with_pages(vec![
        page(&["a", "b", "c"], Some("cur-1")),
        page(&["d", "e", "f"], Some("cur-2")),
        page(&["g", "h"], None),
    ]);

    let records = collect_records(&source, 100).await.unwrap();
    let ids: Vec<&str> = records
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f", "g", "h"]);

    let cursors = source.cursors_seen.lock().await.clone();
    assert_eq!(
        cursors,
        vec![None, Some("cur-1".into()), Some("cur-2".into())]
    );
}

#[tokio::test]
async fn empty_first_page_yields_empty_sequence() {
    let source = ScriptedSource::with_pages(vec![page(&[], None)]);
    let records = collect_records(&source, 100).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn has_more_without_cursor_is_a_protocol_error() {
    let source = ScriptedSource::with_pages(vec![RecordPage {
        results: vec![record("a")],
        has_more: true,
        next_cursor: None,
    }]);
    let err = collect_records(&source, 100).await.unwrap_err();
    assert!(matches!(err, SyncError::SourceProtocol { .. }));
}

#[tokio::test]
async fn protocol_error_mid_walk_aborts_the_run() {
    let source = ScriptedSource::with_outcomes(vec![
        Ok(page(&["a"], Some("cur-1"))),
        Err(SyncError::protocol("page 2: 'has_more' missing")),
    ]);
    let store = RecordingStore::default();

    let err = run_full_sync(&source, &store, SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SourceProtocol { .. }));
    assert!(store.batch_sizes.lock().await.is_empty());
}

#[tokio::test]
async fn batching_issues_ceil_n_over_b_calls() {
    let source = ScriptedSource::with_pages(vec![page(
        &["a", "b", "c", "d", "e", "f", "g", "h"],
        None,
    )]);
    let store = RecordingStore::default();
    let opts = SyncOptions {
        page_size: 100,
        batch_size: 3,
    };

    let summary = run_full_sync(&source, &store, opts).await.unwrap();
    assert_eq!(*store.batch_sizes.lock().await, vec![3, 3, 2]);
    assert_eq!(summary.topics.attempted, 8);
    assert_eq!(summary.topics.succeeded, 8);
    assert_eq!(summary.topics.failed, 0);
}

#[tokio::test]
async fn partial_batch_failure_does_not_abort_the_run() {
    // 130 records, batch size 25 -> 6 calls (25x5 + 5); call 3 fails.
    let ids: Vec<String> = (0..130).map(|i| format!("rec-{i:03}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let source = ScriptedSource::with_pages(vec![
        page(&id_refs[..100], Some("cur-1")),
        page(&id_refs[100..], None),
    ]);
    let store = RecordingStore::failing_batch_calls(&[3]);
    let opts = SyncOptions {
        page_size: 100,
        batch_size: 25,
    };

    let summary = run_full_sync(&source, &store, opts).await.unwrap();

    assert_eq!(*store.batch_sizes.lock().await, vec![25, 25, 25, 25, 25, 5]);
    assert_eq!(summary.topics.attempted, 130);
    assert_eq!(summary.topics.succeeded, 105);
    assert_eq!(summary.topics.failed, 25);
    assert_eq!(
        summary.topics.attempted,
        summary.topics.succeeded + summary.topics.failed
    );
    // Rows from the failed batch never reached the store.
    assert_eq!(store.rows.lock().await.len(), 105);
}

#[tokio::test]
async fn absent_title_flattens_to_untitled() {
    let source = ScriptedSource::with_pages(vec![RecordPage {
        results: vec![json!({ "id": "bare", "properties": {} })],
        has_more: false,
        next_cursor: None,
    }]);
    let store = RecordingStore::default();

    run_full_sync(&source, &store, SyncOptions::default())
        .await
        .unwrap();

    let rows = store.rows.lock().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].topic_name, "Untitled");
    assert_eq!(rows[0].completed_flag, "False");
}

#[tokio::test]
async fn one_record_content_failure_is_isolated() {
    let mut source = ScriptedSource::with_pages(vec![page(&["a", "b", "c"], None)]);
    source.failing_blocks.insert("b".to_string());
    let store = RecordingStore::default();

    let summary = run_full_sync(&source, &store, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.content.attempted, 3);
    assert_eq!(summary.content.succeeded, 2);
    assert_eq!(summary.content.failed, 1);

    let stored: Vec<String> = store
        .content
        .lock()
        .await
        .iter()
        .map(|c| c.source_id.clone())
        .collect();
    assert_eq!(stored, vec!["a", "c"]);
}

#[tokio::test]
async fn content_upsert_failure_is_also_isolated() {
    let source = ScriptedSource::with_pages(vec![page(&["a", "b"], None)]);
    let mut store = RecordingStore::default();
    store.failing_content.insert("a".to_string());

    let summary = run_full_sync(&source, &store, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.content.succeeded, 1);
    assert_eq!(summary.content.failed, 1);
}

#[tokio::test]
async fn block_lists_follow_their_own_pagination() {
    let source = ScriptedSource::with_pages(vec![page(&["a"], None)]);
    source
        .script_blocks(
            "a",
            vec![
                RecordPage {
                    results: vec![json!({ "type": "paragraph", "n": 1 })],
                    has_more: true,
                    next_cursor: Some("bcur-1".into()),
                },
                RecordPage {
                    results: vec![json!({ "type": "paragraph", "n": 2 })],
                    has_more: false,
                    next_cursor: None,
                },
            ],
        )
        .await;
    let store = RecordingStore::default();

    run_full_sync(&source, &store, SyncOptions::default())
        .await
        .unwrap();

    let content = store.content.lock().await;
    assert_eq!(content.len(), 1);
    assert_eq!(content[0].blocks.len(), 2);
    assert_eq!(content[0].blocks[0]["n"], 1);
    assert_eq!(content[0].blocks[1]["n"], 2);
    assert_eq!(content[0].plain_text, "");
}
