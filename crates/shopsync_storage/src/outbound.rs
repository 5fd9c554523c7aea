#![forbid(unsafe_code)]

use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::store::{StorageError, StoreOp};

pub const OUTBOUND_TIMEOUT_MS_DEFAULT: u64 = 10_000;
const USER_AGENT: &str = "shopsync/0.1";

/// `SHOPSYNC_OUTBOUND_TIMEOUT_MS`, bounded to 100..=120000.
pub fn parse_timeout_ms(raw: Option<String>) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| (100..=120_000).contains(v))
        .unwrap_or(OUTBOUND_TIMEOUT_MS_DEFAULT)
}

/// Trimmed value, or `None` when unset or blank.
pub fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn outbound_agent(timeout_ms: u64) -> ureq::Agent {
    let timeout = Duration::from_millis(timeout_ms.max(100));
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(USER_AGENT)
        .build()
}

pub fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    Dns,
    Connection,
    Other,
}

impl TransportFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportFailure::Timeout => "timeout",
            TransportFailure::Dns => "dns",
            TransportFailure::Connection => "connection",
            TransportFailure::Other => "transport",
        }
    }
}

pub fn classify_transport(transport: &ureq::Transport) -> TransportFailure {
    let io_source = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .map(io::Error::kind);
    classify_parts(transport.kind(), io_source)
}

/// Timeouts surface as an io error under either `Io` or `ConnectionFailed`.
fn classify_parts(kind: ureq::ErrorKind, io_source: Option<io::ErrorKind>) -> TransportFailure {
    if matches!(
        io_source,
        Some(io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
    ) {
        return TransportFailure::Timeout;
    }
    match kind {
        ureq::ErrorKind::Dns => TransportFailure::Dns,
        ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::ProxyConnect => {
            TransportFailure::Connection
        }
        _ => TransportFailure::Other,
    }
}

pub fn storage_error_from_ureq(op: StoreOp, table: &str, err: ureq::Error) -> StorageError {
    match err {
        ureq::Error::Status(status, _) => {
            warn!(op = op.as_str(), table, status, "google api returned an error status");
            StorageError::Rejected {
                op,
                table: table.to_string(),
                status,
            }
        }
        ureq::Error::Transport(transport) => match classify_transport(&transport) {
            TransportFailure::Timeout => StorageError::Timeout {
                op,
                table: table.to_string(),
            },
            failure => StorageError::Unavailable {
                op,
                table: table.to_string(),
                detail: format!("{}: {}", failure.as_str(), transport),
            },
        },
    }
}
