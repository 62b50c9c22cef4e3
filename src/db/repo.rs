use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::instrument;

use super::model::{NewPage, NewView, PagePatch, StoredPage, StoredTopic, StoredView, TopicPatch};
use crate::model::{PageContent, TopicRow};
use crate::sync::SyncStore;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the
/// parent directory exists. In-memory URLs and other schemes pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{expanded_path}");
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// ---- topics ----

const TOPIC_COLUMNS: &str = "id, source_id, topic_name, subject_category, sequence_number, \
    priority, source_material, duration, planned_date, mcq_date, first_revision_date, \
    completed_flag, first_revision_flag, second_revision_flag, times_repeated, pyq_notes, \
    created_at";

/// Write one batch of mirrored topic rows. Conflicting `source_id`s are
/// updated in place so a re-sync converges instead of duplicating rows.
#[instrument(skip_all, fields(rows = rows.len()))]
pub async fn upsert_topic_batch(pool: &Pool, rows: &[TopicRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO topics (source_id, topic_name, subject_category, sequence_number, \
         priority, source_material, duration, planned_date, mcq_date, first_revision_date, \
         completed_flag, first_revision_flag, second_revision_flag, times_repeated, pyq_notes) ",
    );
    qb.push_values(rows, |mut b, row| {
        b.push_bind(&row.source_id)
            .push_bind(&row.topic_name)
            .push_bind(&row.subject_category)
            .push_bind(row.sequence_number)
            .push_bind(&row.priority)
            .push_bind(&row.source_material)
            .push_bind(row.duration)
            .push_bind(&row.planned_date)
            .push_bind(&row.mcq_date)
            .push_bind(&row.first_revision_date)
            .push_bind(&row.completed_flag)
            .push_bind(&row.first_revision_flag)
            .push_bind(&row.second_revision_flag)
            .push_bind(row.times_repeated)
            .push_bind(&row.pyq_notes);
    });
    qb.push(
        " ON CONFLICT(source_id) DO UPDATE SET \
         topic_name = excluded.topic_name, \
         subject_category = excluded.subject_category, \
         sequence_number = excluded.sequence_number, \
         priority = excluded.priority, \
         source_material = excluded.source_material, \
         duration = excluded.duration, \
         planned_date = excluded.planned_date, \
         mcq_date = excluded.mcq_date, \
         first_revision_date = excluded.first_revision_date, \
         completed_flag = excluded.completed_flag, \
         first_revision_flag = excluded.first_revision_flag, \
         second_revision_flag = excluded.second_revision_flag, \
         times_repeated = excluded.times_repeated, \
         pyq_notes = excluded.pyq_notes",
    );
    qb.build().execute(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_topics(pool: &Pool) -> Result<Vec<StoredTopic>> {
    let rows = sqlx::query_as::<_, StoredTopic>(&format!(
        "SELECT {TOPIC_COLUMNS} FROM topics ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip_all)]
pub async fn get_topic(pool: &Pool, id: i64) -> Result<Option<StoredTopic>> {
    let row = sqlx::query_as::<_, StoredTopic>(&format!(
        "SELECT {TOPIC_COLUMNS} FROM topics WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn create_topic(pool: &Pool, row: &TopicRow) -> Result<StoredTopic> {
    upsert_topic_batch(pool, std::slice::from_ref(row)).await?;
    let stored = sqlx::query_as::<_, StoredTopic>(&format!(
        "SELECT {TOPIC_COLUMNS} FROM topics WHERE source_id = ?"
    ))
    .bind(&row.source_id)
    .fetch_one(pool)
    .await?;
    Ok(stored)
}

/// Apply a partial update; returns the updated row, or None when the id
/// does not exist. An empty patch is a no-op read.
#[instrument(skip_all)]
pub async fn update_topic(pool: &Pool, id: i64, patch: &TopicPatch) -> Result<Option<StoredTopic>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE topics SET ");
    let mut any = false;
    {
        let mut sep = qb.separated(", ");
        macro_rules! set_field {
            ($field:ident) => {
                if let Some(v) = &patch.$field {
                    sep.push(concat!(stringify!($field), " = "));
                    sep.push_bind_unseparated(v);
                    any = true;
                }
            };
        }
        set_field!(topic_name);
        set_field!(subject_category);
        set_field!(priority);
        set_field!(source_material);
        set_field!(duration);
        set_field!(planned_date);
        set_field!(mcq_date);
        set_field!(first_revision_date);
        set_field!(completed_flag);
        set_field!(first_revision_flag);
        set_field!(second_revision_flag);
        set_field!(times_repeated);
        set_field!(pyq_notes);
    }
    if any {
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(pool).await?;
    }
    get_topic(pool, id).await
}

#[instrument(skip_all)]
pub async fn delete_topic(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM topics WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

// ---- page content ----

/// Replace the stored block list for a record, keyed by `source_id`.
#[instrument(skip_all, fields(source_id = %content.source_id))]
pub async fn upsert_page_content(pool: &Pool, content: &PageContent) -> Result<()> {
    let blocks = serde_json::to_string(&content.blocks).context("serialize blocks")?;
    sqlx::query(
        "INSERT INTO page_content (source_id, blocks, plain_text, synced_at) \
         VALUES (?, ?, ?, CURRENT_TIMESTAMP) \
         ON CONFLICT(source_id) DO UPDATE SET \
         blocks = excluded.blocks, plain_text = excluded.plain_text, \
         synced_at = CURRENT_TIMESTAMP",
    )
    .bind(&content.source_id)
    .bind(blocks)
    .bind(&content.plain_text)
    .execute(pool)
    .await?;
    Ok(())
}

/// Stored block list for a record, or None when it was never synced.
#[instrument(skip_all)]
pub async fn get_page_content(pool: &Pool, source_id: &str) -> Result<Option<Vec<Value>>> {
    let blocks: Option<String> =
        sqlx::query_scalar("SELECT blocks FROM page_content WHERE source_id = ?")
            .bind(source_id)
            .fetch_optional(pool)
            .await?;
    match blocks {
        Some(raw) => Ok(Some(
            serde_json::from_str(&raw).context("stored blocks are not valid JSON")?,
        )),
        None => Ok(None),
    }
}

#[instrument(skip_all)]
pub async fn count_page_content(pool: &Pool, source_id: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM page_content WHERE source_id = ?")
        .bind(source_id)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

// ---- pages ----

const PAGE_COLUMNS: &str = "id, title, content_html, parent_id, icon, created_at";

#[instrument(skip_all)]
pub async fn list_root_pages(pool: &Pool) -> Result<Vec<StoredPage>> {
    let rows = sqlx::query_as::<_, StoredPage>(&format!(
        "SELECT {PAGE_COLUMNS} FROM pages WHERE parent_id IS NULL ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip_all)]
pub async fn get_page(pool: &Pool, id: i64) -> Result<Option<StoredPage>> {
    let row = sqlx::query_as::<_, StoredPage>(&format!(
        "SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn list_child_pages(pool: &Pool, parent_id: i64) -> Result<Vec<StoredPage>> {
    let rows = sqlx::query_as::<_, StoredPage>(&format!(
        "SELECT {PAGE_COLUMNS} FROM pages WHERE parent_id = ? ORDER BY created_at"
    ))
    .bind(parent_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip_all)]
pub async fn create_page(pool: &Pool, page: &NewPage) -> Result<StoredPage> {
    let id: i64 = sqlx::query(
        "INSERT INTO pages (title, content_html, parent_id, icon) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(page.title.as_deref().unwrap_or("Untitled"))
    .bind(page.content_html.as_deref().unwrap_or(""))
    .bind(page.parent_id)
    .bind(page.icon.as_deref().unwrap_or("📝"))
    .fetch_one(pool)
    .await?
    .get("id");
    get_page(pool, id)
        .await?
        .context("page vanished after insert")
}

#[instrument(skip_all)]
pub async fn update_page(pool: &Pool, id: i64, patch: &PagePatch) -> Result<Option<StoredPage>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE pages SET ");
    let mut any = false;
    {
        let mut sep = qb.separated(", ");
        if let Some(title) = &patch.title {
            sep.push("title = ");
            sep.push_bind_unseparated(title);
            any = true;
        }
        if let Some(html) = &patch.content_html {
            sep.push("content_html = ");
            sep.push_bind_unseparated(html);
            any = true;
        }
        if let Some(icon) = &patch.icon {
            sep.push("icon = ");
            sep.push_bind_unseparated(icon);
            any = true;
        }
    }
    if any {
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(pool).await?;
    }
    get_page(pool, id).await
}

#[instrument(skip_all)]
pub async fn delete_page(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM pages WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

// ---- views ----

#[instrument(skip_all)]
pub async fn list_views(pool: &Pool) -> Result<Vec<StoredView>> {
    let rows = sqlx::query(
        "SELECT id, name, view_type, config, created_at FROM database_views ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(view_from_row).collect()
}

#[instrument(skip_all)]
pub async fn create_view(pool: &Pool, view: &NewView) -> Result<StoredView> {
    let config = serde_json::to_string(&view.config).context("serialize view config")?;
    let row = sqlx::query(
        "INSERT INTO database_views (name, view_type, config) VALUES (?, ?, ?) \
         RETURNING id, name, view_type, config, created_at",
    )
    .bind(&view.name)
    .bind(&view.view_type)
    .bind(config)
    .fetch_one(pool)
    .await?;
    view_from_row(row)
}

fn view_from_row(row: sqlx::sqlite::SqliteRow) -> Result<StoredView> {
    let raw: String = row.get("config");
    Ok(StoredView {
        id: row.get("id"),
        name: row.get("name"),
        view_type: row.get("view_type"),
        config: serde_json::from_str(&raw).unwrap_or(Value::Null),
        created_at: row.get("created_at"),
    })
}

// ---- sync store ----

/// SQLite-backed destination store used by the sync engine.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStore for SqliteStore {
    async fn insert_topics(&self, rows: &[TopicRow]) -> Result<()> {
        upsert_topic_batch(&self.pool, rows).await
    }

    async fn upsert_content(&self, content: &PageContent) -> Result<()> {
        upsert_page_content(&self.pool, content).await
    }
}
