#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use crate::common::{ContractViolation, Validate};

/// Position of a data row, counted from the first row below the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataRowIndex(pub usize);

impl DataRowIndex {
    /// Absolute row in the backing store, where row 0 holds the header.
    pub fn store_row(self) -> usize {
        self.0 + 1
    }
}

/// Column name to display string, in the order the columns were produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlattenedRow {
    cells: Vec<(String, String)>,
}

impl FlattenedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// A header row plus positional data rows, as read from the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Splits raw store rows: the first row is the header, the rest are data rows.
    pub fn from_store_rows(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        let mut rows = rows.into_iter();
        let header = rows.next().unwrap_or_default();
        Self {
            name: name.into(),
            header,
            rows: rows.collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn has_header(&self) -> bool {
        !self.header.is_empty()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn data_row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.header.iter().position(|name| name == column)
    }

    /// Cells past the end of a short row read as empty.
    pub fn cell(&self, row: DataRowIndex, column: usize) -> &str {
        self.rows
            .get(row.0)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Row cells padded with empty strings to the header width.
    pub fn padded_row(&self, row: DataRowIndex) -> Option<Vec<String>> {
        let cells = self.rows.get(row.0)?;
        let width = self.header.len().max(cells.len());
        Some(
            (0..width)
                .map(|column| cells.get(column).cloned().unwrap_or_default())
                .collect(),
        )
    }
}

impl Validate for Table {
    fn validate(&self) -> Result<(), ContractViolation> {
        let mut seen = BTreeSet::new();
        for name in &self.header {
            if name.trim().is_empty() {
                return Err(ContractViolation::InvalidValue {
                    field: "table.header",
                    reason: "column names must not be empty",
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(ContractViolation::InvalidValue {
                    field: "table.header",
                    reason: "column names must be unique",
                });
            }
        }
        if self.rows.iter().any(|row| row.len() > self.header.len()) {
            return Err(ContractViolation::InvalidValue {
                field: "table.rows",
                reason: "row is wider than the header",
            });
        }
        Ok(())
    }
}
