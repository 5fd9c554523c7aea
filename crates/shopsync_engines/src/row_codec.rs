#![forbid(unsafe_code)]

use shopsync_contracts::{FlattenedRow, Record, RecordValue};

/// Flattens a record into one display string per top-level field, in field order.
///
/// Scalars become their display text (`null` becomes the empty string). Sequences
/// and mappings become compact JSON text with non-ASCII characters left as-is,
/// so the nested value can be recovered by parsing the cell.
pub fn flatten(record: &Record) -> FlattenedRow {
    let mut row = FlattenedRow::new();
    for (name, value) in record.fields() {
        row.insert(name, display_value(value));
    }
    row
}

pub fn display_value(value: &RecordValue) -> String {
    match value {
        RecordValue::Null => String::new(),
        RecordValue::Bool(b) => b.to_string(),
        RecordValue::Number(n) => n.to_string(),
        RecordValue::String(s) => s.clone(),
        RecordValue::Sequence(_) | RecordValue::Mapping(_) => encode_json_text(value),
    }
}

pub fn encode_json_text(value: &RecordValue) -> String {
    match serde_json::to_string(&value.to_json()) {
        Ok(text) => text,
        Err(_) => empty_container_text(value).to_string(),
    }
}

fn empty_container_text(value: &RecordValue) -> &'static str {
    match value {
        RecordValue::Sequence(_) => "[]",
        _ => "{}",
    }
}
