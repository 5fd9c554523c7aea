#![forbid(unsafe_code)]

use std::sync::Arc;

use shopsync_contracts::{DataRowIndex, Record, Table, Validate};
use shopsync_engines::{locator, row_codec, schema};
use shopsync_storage::{TableHandle, TabularStore};
use tracing::{debug, info};

use crate::error::SyncError;

/// Reads the whole table and checks its header before anything acts on it.
pub(crate) fn load_table(store: &dyn TabularStore, table: &TableHandle) -> Result<Table, SyncError> {
    let current = Table::from_store_rows(&table.name, store.read_all_rows(table)?);
    current
        .validate()
        .map_err(|violation| SyncError::SchemaInconsistency {
            table: table.name.clone(),
            detail: violation.to_string(),
        })?;
    Ok(current)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertReport {
    pub outcome: UpsertOutcome,
    pub row_index: DataRowIndex,
    pub header_changed: bool,
}

/// Insert-if-absent, overwrite-if-present, keyed by the identifier field.
///
/// Every call re-reads the table. A changed header is written before the data
/// row, so an interrupted upsert leaves at worst an extended header and no
/// misaligned row. Callers serialize calls per table (see `TableWriteGate`).
/// Records are applied in arrival order with no version check: a stale record
/// sent after a newer one overwrites it.
pub struct UpsertEngine {
    store: Arc<dyn TabularStore>,
    identifier_field: String,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn TabularStore>, identifier_field: impl Into<String>) -> Self {
        Self {
            store,
            identifier_field: identifier_field.into(),
        }
    }

    pub fn upsert(&self, table: &TableHandle, record: &Record) -> Result<UpsertReport, SyncError> {
        let id = record.identifier(&self.identifier_field)?;
        let current = load_table(self.store.as_ref(), table)?;
        locator::identifier_column(&current, &self.identifier_field)?;

        let flat = row_codec::flatten(record);
        let reconciled = schema::reconcile(current.header(), &flat);
        if reconciled.header_changed {
            debug!(
                table = %table.name,
                appended = ?reconciled.appended,
                "extending header"
            );
            self.store.write_row_range(table, 0, &reconciled.header)?;
        }

        let cells = schema::build_full_row(&reconciled.header, &flat);
        let id_column = reconciled
            .header
            .iter()
            .position(|name| *name == self.identifier_field)
            .ok_or_else(|| SyncError::SchemaInconsistency {
                table: table.name.clone(),
                detail: format!(
                    "identifier column '{}' missing after reconciliation",
                    self.identifier_field
                ),
            })?;

        let report = match locator::find(&current, id_column, &id) {
            Some(row_index) => {
                self.store
                    .write_row_range(table, row_index.store_row(), &cells)?;
                info!(table = %table.name, id = %id, row = row_index.0, "updated record");
                UpsertReport {
                    outcome: UpsertOutcome::Updated,
                    row_index,
                    header_changed: reconciled.header_changed,
                }
            }
            None => {
                self.store.append_row(table, &cells)?;
                let row_index = DataRowIndex(current.data_row_count());
                info!(table = %table.name, id = %id, row = row_index.0, "inserted record");
                UpsertReport {
                    outcome: UpsertOutcome::Inserted,
                    row_index,
                    header_changed: reconciled.header_changed,
                }
            }
        };
        Ok(report)
    }
}
