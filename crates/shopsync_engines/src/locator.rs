#![forbid(unsafe_code)]

use std::fmt;

use shopsync_contracts::{DataRowIndex, RecordId, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorError {
    MissingIdentifierColumn { table: String, column: String },
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorError::MissingIdentifierColumn { table, column } => write!(
                f,
                "table '{table}' has a header without identifier column '{column}'"
            ),
        }
    }
}

impl std::error::Error for LocatorError {}

/// Position of the identifier column. A header-less table has none yet; a
/// non-empty header without it is an inconsistency, never a reason to scan
/// some other column.
pub fn identifier_column(table: &Table, field: &str) -> Result<Option<usize>, LocatorError> {
    if !table.has_header() {
        return Ok(None);
    }
    match table.column_index(field) {
        Some(column) => Ok(Some(column)),
        None => Err(LocatorError::MissingIdentifierColumn {
            table: table.name().to_string(),
            column: field.to_string(),
        }),
    }
}

/// First data row whose identifier cell equals `id` as text. Rows too short to
/// reach the column never match.
pub fn find(table: &Table, column: usize, id: &RecordId) -> Option<DataRowIndex> {
    table
        .rows()
        .iter()
        .position(|cells| cells.get(column).is_some_and(|cell| cell == id.as_str()))
        .map(DataRowIndex)
}
