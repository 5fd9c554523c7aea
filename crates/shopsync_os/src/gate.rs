#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One writer per table: every read-reconcile-write sequence on a table runs
/// under that table's mutex. Different tables proceed independently.
#[derive(Debug, Default)]
pub struct TableWriteGate {
    locks: Mutex<BTreeMap<String, Arc<Mutex<()>>>>,
}

impl TableWriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table<T>(&self, table: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.table_lock(table);
        // Poison is ignored: the mutex guards no data and writers re-read the table.
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    #[cfg(test)]
    fn tracked_tables(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
