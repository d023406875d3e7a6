//! Per-user document model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::LogEntry;
use crate::store::Document;

/// Name of the array field holding a user's attendance log
pub const ATTENDANCE_FIELD: &str = "attendance";

/// A user's record in the `users` collection
///
/// Only the attendance log is modeled; other fields on the document are left
/// untouched by this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Append-ordered attendance log
    #[serde(default)]
    pub attendance: Vec<LogEntry>,
}

impl UserRecord {
    /// Decode a record from a raw store document.
    ///
    /// A missing or non-array `attendance` field yields an empty log. Elements
    /// that are not valid entries are skipped with a warning so one bad write
    /// from another client does not hide the rest of the history.
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        let attendance = match document.get(ATTENDANCE_FIELD) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match serde_json::from_value::<LogEntry>(item.clone()) {
                    Ok(entry) => Some(entry),
                    Err(error) => {
                        tracing::warn!("Skipping malformed attendance entry {}: {}", item, error);
                        None
                    }
                })
                .collect(),
            Some(other) => {
                tracing::warn!(
                    "Ignoring non-array attendance field of type {}",
                    json_type_name(other)
                );
                Vec::new()
            }
            None => Vec::new(),
        };

        Self { attendance }
    }

    /// Fresh document for a user with an empty log
    #[must_use]
    pub fn empty_document() -> Document {
        let mut document = Document::new();
        document.insert(ATTENDANCE_FIELD.to_string(), Value::Array(Vec::new()));
        document
    }
}

pub(crate) const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::models::LogKind;

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn missing_attendance_field_is_empty() {
        let record = UserRecord::from_document(&document(json!({ "name": "Ada" })));
        assert!(record.attendance.is_empty());
    }

    #[test]
    fn decodes_entries_in_stored_order() {
        let record = UserRecord::from_document(&document(json!({
            "attendance": [
                { "id": "t0", "type": "IN", "timestamp": "t0" },
                { "id": "t1", "type": "OUT", "timestamp": "t1" },
            ]
        })));
        let kinds = record
            .attendance
            .iter()
            .map(|entry| entry.kind)
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![LogKind::In, LogKind::Out]);
    }

    #[test]
    fn skips_malformed_entries() {
        let record = UserRecord::from_document(&document(json!({
            "attendance": [
                { "id": "t0", "type": "IN", "timestamp": "t0" },
                { "id": "broken" },
                42,
            ]
        })));
        assert_eq!(record.attendance.len(), 1);
        assert_eq!(record.attendance[0].id, "t0");
    }

    #[test]
    fn non_array_attendance_is_empty() {
        let record = UserRecord::from_document(&document(json!({ "attendance": "nope" })));
        assert!(record.attendance.is_empty());
    }

    #[test]
    fn empty_document_has_attendance_array() {
        let doc = UserRecord::empty_document();
        assert_eq!(doc.get(ATTENDANCE_FIELD), Some(&json!([])));
    }
}
