#![forbid(unsafe_code)]

pub mod config;
pub mod delete;
pub mod error;
pub mod gate;
pub mod ingress;
pub mod router;
pub mod upsert;

pub use config::{SyncConfig, TableRoutingConfig};
pub use delete::{DeleteEngine, DeleteReport};
pub use error::SyncError;
pub use gate::TableWriteGate;
pub use ingress::{NotificationReport, RecordOutcome, SyncService, WebhookNotification};
pub use router::TableRouter;
pub use upsert::{UpsertEngine, UpsertOutcome, UpsertReport};
