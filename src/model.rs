use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One flattened row of the mirrored study-topic table, derived 1:1 from a
/// Notion page's property bag. `source_id` is the Notion page id and the
/// join key back to the remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRow {
    pub source_id: String,
    #[serde(default = "default_topic_name")]
    pub topic_name: String,
    #[serde(default)]
    pub subject_category: Option<String>,
    #[serde(default)]
    pub sequence_number: Option<f64>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub source_material: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub planned_date: Option<String>,
    #[serde(default)]
    pub mcq_date: Option<String>,
    #[serde(default)]
    pub first_revision_date: Option<String>,
    #[serde(default = "default_completed_flag")]
    pub completed_flag: String,
    #[serde(default)]
    pub first_revision_flag: Option<String>,
    #[serde(default)]
    pub second_revision_flag: Option<String>,
    #[serde(default)]
    pub times_repeated: Option<f64>,
    #[serde(default)]
    pub pyq_notes: String,
}

fn default_topic_name() -> String {
    "Untitled".to_string()
}

fn default_completed_flag() -> String {
    "False".to_string()
}

/// The full nested block list of one remote record, replaced wholesale on
/// each sync. `plain_text` is reserved for future search indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    pub source_id: String,
    pub blocks: Vec<Value>,
    pub plain_text: String,
}

impl PageContent {
    pub fn new(source_id: impl Into<String>, blocks: Vec<Value>) -> Self {
        Self {
            source_id: source_id.into(),
            blocks,
            plain_text: String::new(),
        }
    }
}

/// Attempted/succeeded/failed accounting for one sync phase.
/// `attempted == succeeded + failed` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl PhaseCounts {
    pub fn ok(&mut self, n: usize) {
        self.attempted += n;
        self.succeeded += n;
    }

    pub fn err(&mut self, n: usize) {
        self.attempted += n;
        self.failed += n;
    }
}

/// Per-run outcome of a full sync: one set of counters for the topic-row
/// phase, one for the page-content phase. Reported, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub topics: PhaseCounts,
    pub content: PhaseCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_counts_balance() {
        let mut c = PhaseCounts::default();
        c.ok(25);
        c.ok(25);
        c.err(25);
        c.ok(5);
        assert_eq!(c.attempted, 80);
        assert_eq!(c.succeeded, 55);
        assert_eq!(c.failed, 25);
        assert_eq!(c.attempted, c.succeeded + c.failed);
    }

    #[test]
    fn topic_row_defaults_from_sparse_json() {
        let row: TopicRow = serde_json::from_value(serde_json::json!({
            "source_id": "abc"
        }))
        .unwrap();
        assert_eq!(row.topic_name, "Untitled");
        assert_eq!(row.completed_flag, "False");
        assert_eq!(row.subject_category, None);
        assert_eq!(row.pyq_notes, "");
    }
}
