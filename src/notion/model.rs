use serde::Deserialize;
use serde_json::Value;

use crate::error::SyncError;

/// Raw pagination envelope as Notion sends it. Fields stay optional so a
/// malformed response can be rejected explicitly instead of silently
/// defaulted.
#[derive(Deserialize, Debug)]
pub struct PageEnvelope {
    pub results: Option<Vec<Value>>,
    pub has_more: Option<bool>,
    pub next_cursor: Option<String>,
}

/// One validated page of records from the remote source.
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub results: Vec<Value>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl PageEnvelope {
    /// Validate the envelope's pagination metadata. `context` names the
    /// request for the error message.
    pub fn validate(self, context: &str) -> Result<RecordPage, SyncError> {
        let results = self
            .results
            .ok_or_else(|| SyncError::protocol(format!("{context}: 'results' missing")))?;
        let has_more = self
            .has_more
            .ok_or_else(|| SyncError::protocol(format!("{context}: 'has_more' missing")))?;
        if has_more && self.next_cursor.is_none() {
            return Err(SyncError::protocol(format!(
                "{context}: has_more set but 'next_cursor' missing"
            )));
        }
        Ok(RecordPage {
            results,
            has_more,
            next_cursor: self.next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(v: Value) -> PageEnvelope {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn validates_complete_envelope() {
        let page = envelope(json!({
            "results": [ { "id": "a" } ],
            "has_more": true,
            "next_cursor": "cur-1"
        }))
        .validate("query")
        .unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(page.has_more);
        assert_eq!(page.next_cursor.as_deref(), Some("cur-1"));
    }

    #[test]
    fn null_cursor_on_last_page_is_fine() {
        let page = envelope(json!({ "results": [], "has_more": false, "next_cursor": null }))
            .validate("query")
            .unwrap();
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn missing_results_is_a_protocol_error() {
        let err = envelope(json!({ "has_more": false }))
            .validate("query")
            .unwrap_err();
        assert!(matches!(err, SyncError::SourceProtocol { .. }));
        assert!(err.to_string().contains("results"));
    }

    #[test]
    fn missing_has_more_is_a_protocol_error() {
        let err = envelope(json!({ "results": [] }))
            .validate("blocks for p1")
            .unwrap_err();
        assert!(matches!(err, SyncError::SourceProtocol { .. }));
        assert!(err.to_string().contains("blocks for p1"));
    }

    #[test]
    fn dangling_has_more_without_cursor_is_rejected() {
        let err = envelope(json!({ "results": [], "has_more": true }))
            .validate("query")
            .unwrap_err();
        assert!(matches!(err, SyncError::SourceProtocol { .. }));
    }
}
