#![forbid(unsafe_code)]

use std::sync::Arc;

use shopsync_contracts::RecordCategory;
use shopsync_storage::{TableHandle, TabularStore};
use tracing::debug;

use crate::config::TableRoutingConfig;
use crate::error::SyncError;

pub struct TableRouter {
    routing: TableRoutingConfig,
    store: Arc<dyn TabularStore>,
}

impl TableRouter {
    pub fn new(routing: TableRoutingConfig, store: Arc<dyn TabularStore>) -> Self {
        Self { routing, store }
    }

    pub fn table_name(&self, category: &RecordCategory) -> &str {
        self.routing.table_for(category)
    }

    /// Handle for the category's table, created empty when the store lacks it.
    pub fn resolve(&self, category: &RecordCategory) -> Result<TableHandle, SyncError> {
        let name = self.table_name(category);
        if !category.is_recognized() {
            debug!(category = category.as_str(), table = name, "routing to default table");
        }
        Ok(self.store.ensure_table_exists(name)?)
    }
}
