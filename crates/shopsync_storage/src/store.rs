#![forbid(unsafe_code)]

use std::fmt;

/// Handle to one table in the backing store. `sheet_id` is the backend's
/// numeric id when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableHandle {
    pub name: String,
    pub sheet_id: Option<u64>,
}

impl TableHandle {
    pub fn new(name: impl Into<String>, sheet_id: Option<u64>) -> Self {
        Self {
            name: name.into(),
            sheet_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ReadAllRows,
    WriteRowRange,
    AppendRow,
    DeleteRow,
    EnsureTable,
    Authenticate,
    OpenSpreadsheet,
}

impl StoreOp {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreOp::ReadAllRows => "read_all_rows",
            StoreOp::WriteRowRange => "write_row_range",
            StoreOp::AppendRow => "append_row",
            StoreOp::DeleteRow => "delete_row",
            StoreOp::EnsureTable => "ensure_table_exists",
            StoreOp::Authenticate => "authenticate",
            StoreOp::OpenSpreadsheet => "open_spreadsheet",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    Unavailable {
        op: StoreOp,
        table: String,
        detail: String,
    },
    Timeout {
        op: StoreOp,
        table: String,
    },
    Rejected {
        op: StoreOp,
        table: String,
        status: u16,
    },
    MalformedResponse {
        op: StoreOp,
        detail: String,
    },
    TableMissing {
        table: String,
    },
    RowOutOfRange {
        table: String,
        row: usize,
        row_count: usize,
    },
    AuthFailed {
        detail: String,
    },
    SpreadsheetMissing {
        title: String,
    },
}

impl StorageError {
    /// Transport failures, timeouts, throttling and 5xx responses may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Unavailable { .. } | StorageError::Timeout { .. } => true,
            StorageError::Rejected { status, .. } => *status == 429 || *status >= 500,
            StorageError::MalformedResponse { .. }
            | StorageError::TableMissing { .. }
            | StorageError::RowOutOfRange { .. }
            | StorageError::AuthFailed { .. }
            | StorageError::SpreadsheetMissing { .. } => false,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unavailable { op, table, detail } => {
                write!(f, "{} on '{}' failed: {}", op.as_str(), table, detail)
            }
            StorageError::Timeout { op, table } => {
                write!(f, "{} on '{}' timed out", op.as_str(), table)
            }
            StorageError::Rejected { op, table, status } => write!(
                f,
                "{} on '{}' rejected with http status {}",
                op.as_str(),
                table,
                status
            ),
            StorageError::MalformedResponse { op, detail } => {
                write!(f, "{} returned a malformed response: {}", op.as_str(), detail)
            }
            StorageError::TableMissing { table } => write!(f, "table '{table}' does not exist"),
            StorageError::RowOutOfRange {
                table,
                row,
                row_count,
            } => write!(
                f,
                "row {row} is out of range for table '{table}' ({row_count} rows)"
            ),
            StorageError::AuthFailed { detail } => write!(f, "authentication failed: {detail}"),
            StorageError::SpreadsheetMissing { title } => {
                write!(f, "no spreadsheet titled '{title}' is shared with the service account")
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// Row-oriented tabular backend. Row indices are absolute: row 0 holds the header.
pub trait TabularStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Returns the handle for `name`, creating an empty table when it is absent.
    fn ensure_table_exists(&self, name: &str) -> Result<TableHandle, StorageError>;

    fn read_all_rows(&self, table: &TableHandle) -> Result<Vec<Vec<String>>, StorageError>;

    /// Overwrites cells `0..cells.len()` of `row`. Cells past that range are left as they are.
    fn write_row_range(
        &self,
        table: &TableHandle,
        row: usize,
        cells: &[String],
    ) -> Result<(), StorageError>;

    fn append_row(&self, table: &TableHandle, cells: &[String]) -> Result<(), StorageError>;

    /// Removes `row`; later rows shift up by one.
    fn delete_row(&self, table: &TableHandle, row: usize) -> Result<(), StorageError>;
}
