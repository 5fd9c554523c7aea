#![forbid(unsafe_code)]

use std::fmt;

use shopsync_contracts::ContractViolation;
use shopsync_engines::fetch::FetchError;
use shopsync_engines::locator::LocatorError;
use shopsync_storage::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The notification cannot be applied as sent. Nothing was written.
    MalformedPayload { reason: String },
    /// The table's header lacks the identifier column.
    SchemaInconsistency { table: String, detail: String },
    /// The backing store or the upstream fetch failed in a way a retry may fix.
    StoreUnavailable { detail: String },
    /// The backing store refused the call; retrying the same call will not help.
    StoreRejected { detail: String },
}

impl SyncError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        SyncError::MalformedPayload {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::StoreUnavailable { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            SyncError::SchemaInconsistency { .. } => "SCHEMA_INCONSISTENCY",
            SyncError::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            SyncError::StoreRejected { .. } => "STORE_REJECTED",
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::MalformedPayload { reason } => write!(f, "malformed payload: {reason}"),
            SyncError::SchemaInconsistency { table, detail } => {
                write!(f, "schema inconsistency in '{table}': {detail}")
            }
            SyncError::StoreUnavailable { detail } => write!(f, "store unavailable: {detail}"),
            SyncError::StoreRejected { detail } => write!(f, "store rejected the call: {detail}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        let detail = err.to_string();
        if err.is_retryable() {
            SyncError::StoreUnavailable { detail }
        } else {
            SyncError::StoreRejected { detail }
        }
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        SyncError::StoreUnavailable {
            detail: err.to_string(),
        }
    }
}

impl From<ContractViolation> for SyncError {
    fn from(v: ContractViolation) -> Self {
        SyncError::MalformedPayload {
            reason: v.to_string(),
        }
    }
}

impl From<LocatorError> for SyncError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::MissingIdentifierColumn { ref table, .. } => {
                SyncError::SchemaInconsistency {
                    table: table.clone(),
                    detail: err.to_string(),
                }
            }
        }
    }
}
