#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use shopsync_contracts::FlattenedRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReconciliation {
    pub header: Vec<String>,
    pub header_changed: bool,
    pub appended: Vec<String>,
}

/// Grows `current` with the row's unseen columns, appended in encounter order.
///
/// Existing columns are never removed or moved. When `header_changed` is set the
/// caller must persist the header before writing any row that uses the new positions.
pub fn reconcile(current: &[String], row: &FlattenedRow) -> SchemaReconciliation {
    let mut known: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let mut appended = Vec::new();
    for column in row.columns() {
        if known.insert(column) {
            appended.push(column.to_string());
        }
    }
    let mut header = current.to_vec();
    header.extend(appended.iter().cloned());
    SchemaReconciliation {
        header_changed: !appended.is_empty(),
        header,
        appended,
    }
}

/// One cell per header column; columns the row does not mention are empty.
pub fn build_full_row(header: &[String], row: &FlattenedRow) -> Vec<String> {
    header
        .iter()
        .map(|column| row.get(column).unwrap_or_default().to_string())
        .collect()
}
