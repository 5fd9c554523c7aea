#![forbid(unsafe_code)]

pub mod category;
pub mod common;
pub mod record;
pub mod table;

pub use category::{RecordCategory, WebhookOperation};
pub use common::{ContractViolation, Validate};
pub use record::{Record, RecordId, RecordValue};
pub use table::{DataRowIndex, FlattenedRow, Table};
