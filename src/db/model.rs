//! Database entity and view models used by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business
//! logic should live in higher layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mirrored topic row as stored, with its local key and sync timestamp.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredTopic {
    pub id: i64,
    pub source_id: String,
    pub topic_name: String,
    pub subject_category: Option<String>,
    pub sequence_number: Option<f64>,
    pub priority: Option<String>,
    pub source_material: Option<String>,
    pub duration: Option<f64>,
    pub planned_date: Option<String>,
    pub mcq_date: Option<String>,
    pub first_revision_date: Option<String>,
    pub completed_flag: String,
    pub first_revision_flag: Option<String>,
    pub second_revision_flag: Option<String>,
    pub times_repeated: Option<f64>,
    pub pyq_notes: String,
    pub created_at: DateTime<Utc>,
}

/// Partial update for a stored topic; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicPatch {
    pub topic_name: Option<String>,
    pub subject_category: Option<String>,
    pub priority: Option<String>,
    pub source_material: Option<String>,
    pub duration: Option<f64>,
    pub planned_date: Option<String>,
    pub mcq_date: Option<String>,
    pub first_revision_date: Option<String>,
    pub completed_flag: Option<String>,
    pub first_revision_flag: Option<String>,
    pub second_revision_flag: Option<String>,
    pub times_repeated: Option<f64>,
    pub pyq_notes: Option<String>,
}

/// A locally authored notebook page.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredPage {
    pub id: i64,
    pub title: String,
    pub content_html: String,
    pub parent_id: Option<i64>,
    pub icon: String,
    pub created_at: DateTime<Utc>,
}

/// Creation payload for a notebook page; defaults mirror the HTTP surface.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPage {
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub parent_id: Option<i64>,
    pub icon: Option<String>,
}

/// Partial update for a notebook page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagePatch {
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub icon: Option<String>,
}

/// A saved client view definition (table, board, calendar...).
#[derive(Debug, Clone, Serialize)]
pub struct StoredView {
    pub id: i64,
    pub name: String,
    pub view_type: String,
    pub config: Value,
    pub created_at: DateTime<Utc>,
}

/// Creation payload for a saved view.
#[derive(Debug, Clone, Deserialize)]
pub struct NewView {
    pub name: String,
    #[serde(default = "default_view_type")]
    pub view_type: String,
    #[serde(default)]
    pub config: Value,
}

fn default_view_type() -> String {
    "table".to_string()
}
