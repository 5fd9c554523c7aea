#![forbid(unsafe_code)]

use std::sync::Arc;

use shopsync_contracts::{DataRowIndex, RecordId};
use shopsync_engines::locator;
use shopsync_storage::{TableHandle, TabularStore};
use tracing::info;

use crate::error::SyncError;
use crate::upsert::load_table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: bool,
    pub row_index: Option<DataRowIndex>,
}

/// Removes the first row matching an identifier. A miss is not an error, so
/// retried deletes are harmless.
pub struct DeleteEngine {
    store: Arc<dyn TabularStore>,
    identifier_field: String,
}

impl DeleteEngine {
    pub fn new(store: Arc<dyn TabularStore>, identifier_field: impl Into<String>) -> Self {
        Self {
            store,
            identifier_field: identifier_field.into(),
        }
    }

    pub fn delete(&self, table: &TableHandle, id: &RecordId) -> Result<DeleteReport, SyncError> {
        let current = load_table(self.store.as_ref(), table)?;
        let Some(column) = locator::identifier_column(&current, &self.identifier_field)? else {
            return Ok(DeleteReport {
                deleted: false,
                row_index: None,
            });
        };
        let Some(row_index) = locator::find(&current, column, id) else {
            info!(table = %table.name, id = %id, "delete found no matching row");
            return Ok(DeleteReport {
                deleted: false,
                row_index: None,
            });
        };
        self.store.delete_row(table, row_index.store_row())?;
        info!(table = %table.name, id = %id, row = row_index.0, "deleted record");
        Ok(DeleteReport {
            deleted: true,
            row_index: Some(row_index),
        })
    }
}
