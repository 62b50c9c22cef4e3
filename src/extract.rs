//! Pure property extraction: maps one Notion property bag into a flat
//! [`TopicRow`](crate::model::TopicRow).
//!
//! Every extractor is total — a missing or oddly-shaped property yields the
//! documented default, never an error. The destination-column ↔ Notion
//! property-name mapping lives in [`TOPIC_FIELDS`] so schema evolution only
//! touches the table.

use serde_json::{Map, Value};

use crate::model::TopicRow;

/// External property types the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Title,
    RichText,
    Select,
    Number,
    Date,
    /// Extracted as the count of linked records, not their content.
    Relation,
}

/// One destination column mapped to one Notion property.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub column: &'static str,
    pub property: &'static str,
    pub kind: FieldKind,
}

/// Column ↔ property mapping for the mirrored topic table. `source_id`
/// comes from the page object itself, not the property bag.
pub const TOPIC_FIELDS: [FieldSpec; 14] = [
    FieldSpec { column: "topic_name", property: "Topic Name", kind: FieldKind::Title },
    FieldSpec { column: "subject_category", property: "Subject Category", kind: FieldKind::Select },
    FieldSpec { column: "sequence_number", property: "No.", kind: FieldKind::Number },
    FieldSpec { column: "priority", property: "Priority", kind: FieldKind::Select },
    FieldSpec { column: "source_material", property: "Source to be Studied", kind: FieldKind::Select },
    FieldSpec { column: "duration", property: "Duration to be Studied", kind: FieldKind::Number },
    FieldSpec { column: "planned_date", property: "Planned Date", kind: FieldKind::Date },
    FieldSpec { column: "mcq_date", property: "mcq solving date", kind: FieldKind::Date },
    FieldSpec { column: "first_revision_date", property: "1st revision date", kind: FieldKind::Date },
    FieldSpec { column: "completed_flag", property: "Completed", kind: FieldKind::Select },
    FieldSpec { column: "first_revision_flag", property: "1st Revision", kind: FieldKind::Select },
    FieldSpec { column: "second_revision_flag", property: "2nd Revision", kind: FieldKind::Select },
    FieldSpec { column: "times_repeated", property: "Times Repeated", kind: FieldKind::Number },
    FieldSpec { column: "pyq_notes", property: "PYQ Asked", kind: FieldKind::RichText },
];

/// Plain text of the first text run under `key` ("title" or "rich_text").
fn first_run_text(prop: Option<&Value>, key: &str) -> String {
    prop.and_then(|p| p.get(key))
        .and_then(|runs| runs.get(0))
        .and_then(|run| run.get("plain_text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn extract_title(prop: Option<&Value>) -> String {
    first_run_text(prop, "title")
}

pub fn extract_rich_text(prop: Option<&Value>) -> String {
    first_run_text(prop, "rich_text")
}

pub fn extract_select(prop: Option<&Value>) -> Option<String> {
    prop.and_then(|p| p.get("select"))
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn extract_number(prop: Option<&Value>) -> Option<f64> {
    prop.and_then(|p| p.get("number")).and_then(Value::as_f64)
}

/// Start date of the property's date range, as the ISO string Notion sent.
pub fn extract_date(prop: Option<&Value>) -> Option<String> {
    prop.and_then(|p| p.get("date"))
        .and_then(|d| d.get("start"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Number of linked records in a relation property.
pub fn extract_relation_count(prop: Option<&Value>) -> u64 {
    prop.and_then(|p| p.get("relation"))
        .and_then(Value::as_array)
        .map(|a| a.len() as u64)
        .unwrap_or(0)
}

/// Extract one property per its declared kind into a JSON scalar.
fn extract_field(kind: FieldKind, prop: Option<&Value>) -> Value {
    match kind {
        FieldKind::Title => Value::String(extract_title(prop)),
        FieldKind::RichText => Value::String(extract_rich_text(prop)),
        FieldKind::Select => extract_select(prop).map(Value::String).unwrap_or(Value::Null),
        FieldKind::Number => extract_number(prop)
            .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
            .unwrap_or(Value::Null),
        FieldKind::Date => extract_date(prop).map(Value::String).unwrap_or(Value::Null),
        FieldKind::Relation => Value::Number(extract_relation_count(prop).into()),
    }
}

/// Flatten one Notion page object into a [`TopicRow`].
///
/// Total: an empty or malformed property bag produces a row of defaults.
/// `topic_name` falls back to `"Untitled"` and `completed_flag` to
/// `"False"`, matching the destination schema.
pub fn flatten_record(page: &Value) -> TopicRow {
    let source_id = page
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let props = page.get("properties");

    let mut fields = Map::new();
    fields.insert("source_id".into(), Value::String(source_id));
    for field in TOPIC_FIELDS {
        let prop = props.and_then(|p| p.get(field.property));
        fields.insert(field.column.into(), extract_field(field.kind, prop));
    }

    // Sentinel defaults the wire format expresses as empty/null.
    if fields.get("topic_name").and_then(Value::as_str) == Some("") {
        fields.insert("topic_name".into(), Value::String("Untitled".into()));
    }
    if fields.get("completed_flag") == Some(&Value::Null) {
        fields.insert("completed_flag".into(), Value::String("False".into()));
    }

    // All TopicRow fields are defaultable and every extracted value matches
    // its field's type, so this conversion cannot fail.
    serde_json::from_value(Value::Object(fields)).expect("extracted fields form a TopicRow")
}
