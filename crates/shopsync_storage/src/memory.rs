#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::store::{StorageError, StoreOp, TableHandle, TabularStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOpRecord {
    pub op: StoreOp,
    pub table: String,
    pub row: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    sheet_id: u64,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    next_sheet_id: u64,
    pending_failures: Vec<StoreOp>,
    op_log: Vec<StoreOpRecord>,
}

/// Process-local store with the same row semantics the Sheets backend exposes:
/// trailing empty cells and trailing empty rows are not reported back.
#[derive(Debug, Default)]
pub struct InMemoryTabularStore {
    state: Mutex<MemoryState>,
}

impl InMemoryTabularStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces (or creates) `name` with `rows`, header first.
    pub fn seed_table(&self, name: &str, rows: Vec<Vec<String>>) -> Result<(), StorageError> {
        let mut state = self.lock(StoreOp::EnsureTable, name)?;
        let sheet_id = state.allocate_sheet_id(name);
        state.tables.insert(
            name.to_string(),
            MemoryTable {
                sheet_id,
                rows: rows.into_iter().map(trim_trailing_empty).collect(),
            },
        );
        Ok(())
    }

    pub fn snapshot(&self, name: &str) -> Option<Vec<Vec<String>>> {
        let state = self.state.lock().ok()?;
        state.tables.get(name).map(|t| visible_rows(&t.rows))
    }

    pub fn table_names(&self) -> Vec<String> {
        match self.state.lock() {
            Ok(state) => state.tables.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Makes the next call of `op` fail as if the backend were unreachable.
    pub fn fail_next(&self, op: StoreOp) {
        if let Ok(mut state) = self.state.lock() {
            state.pending_failures.push(op);
        }
    }

    /// Mutating calls in the order they were applied.
    pub fn mutation_log(&self) -> Vec<StoreOpRecord> {
        match self.state.lock() {
            Ok(state) => state.op_log.clone(),
            Err(_) => Vec::new(),
        }
    }

    fn lock(&self, op: StoreOp, table: &str) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        let mut state = self.state.lock().map_err(|_| StorageError::Unavailable {
            op,
            table: table.to_string(),
            detail: "in-memory store lock poisoned".to_string(),
        })?;
        if let Some(pos) = state.pending_failures.iter().position(|p| *p == op) {
            state.pending_failures.remove(pos);
            return Err(StorageError::Unavailable {
                op,
                table: table.to_string(),
                detail: "injected failure".to_string(),
            });
        }
        Ok(state)
    }
}

impl MemoryState {
    fn allocate_sheet_id(&mut self, name: &str) -> u64 {
        if let Some(existing) = self.tables.get(name) {
            return existing.sheet_id;
        }
        self.next_sheet_id = self.next_sheet_id.saturating_add(1);
        self.next_sheet_id
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, StorageError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::TableMissing {
                table: name.to_string(),
            })
    }

    fn record(&mut self, op: StoreOp, table: &str, row: Option<usize>) {
        self.op_log.push(StoreOpRecord {
            op,
            table: table.to_string(),
            row,
        });
    }
}

impl TabularStore for InMemoryTabularStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn ensure_table_exists(&self, name: &str) -> Result<TableHandle, StorageError> {
        let mut state = self.lock(StoreOp::EnsureTable, name)?;
        if let Some(existing) = state.tables.get(name) {
            return Ok(TableHandle::new(name, Some(existing.sheet_id)));
        }
        let sheet_id = state.allocate_sheet_id(name);
        state.tables.insert(
            name.to_string(),
            MemoryTable {
                sheet_id,
                rows: Vec::new(),
            },
        );
        state.record(StoreOp::EnsureTable, name, None);
        Ok(TableHandle::new(name, Some(sheet_id)))
    }

    fn read_all_rows(&self, table: &TableHandle) -> Result<Vec<Vec<String>>, StorageError> {
        let mut state = self.lock(StoreOp::ReadAllRows, &table.name)?;
        let t = state.table_mut(&table.name)?;
        Ok(visible_rows(&t.rows))
    }

    fn write_row_range(
        &self,
        table: &TableHandle,
        row: usize,
        cells: &[String],
    ) -> Result<(), StorageError> {
        let mut state = self.lock(StoreOp::WriteRowRange, &table.name)?;
        let t = state.table_mut(&table.name)?;
        if t.rows.len() <= row {
            t.rows.resize_with(row + 1, Vec::new);
        }
        let target = &mut t.rows[row];
        if target.len() < cells.len() {
            target.resize(cells.len(), String::new());
        }
        target[..cells.len()].clone_from_slice(cells);
        let trimmed = trim_trailing_empty(std::mem::take(target));
        *target = trimmed;
        state.record(StoreOp::WriteRowRange, &table.name, Some(row));
        Ok(())
    }

    fn append_row(&self, table: &TableHandle, cells: &[String]) -> Result<(), StorageError> {
        let mut state = self.lock(StoreOp::AppendRow, &table.name)?;
        let t = state.table_mut(&table.name)?;
        let visible = visible_len(&t.rows);
        t.rows.truncate(visible);
        t.rows.push(trim_trailing_empty(cells.to_vec()));
        let row = t.rows.len() - 1;
        state.record(StoreOp::AppendRow, &table.name, Some(row));
        Ok(())
    }

    fn delete_row(&self, table: &TableHandle, row: usize) -> Result<(), StorageError> {
        let mut state = self.lock(StoreOp::DeleteRow, &table.name)?;
        let t = state.table_mut(&table.name)?;
        if row >= t.rows.len() {
            return Err(StorageError::RowOutOfRange {
                table: table.name.clone(),
                row,
                row_count: t.rows.len(),
            });
        }
        t.rows.remove(row);
        state.record(StoreOp::DeleteRow, &table.name, Some(row));
        Ok(())
    }
}

fn trim_trailing_empty(mut cells: Vec<String>) -> Vec<String> {
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

fn visible_len(rows: &[Vec<String>]) -> usize {
    rows.iter()
        .rposition(|row| !row.is_empty())
        .map(|pos| pos + 1)
        .unwrap_or(0)
}

fn visible_rows(rows: &[Vec<String>]) -> Vec<Vec<String>> {
    rows[..visible_len(rows)].to_vec()
}
