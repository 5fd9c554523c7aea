#![forbid(unsafe_code)]

pub mod auth;
pub mod memory;
pub mod outbound;
pub mod sheets;
pub mod store;

pub use auth::{ServiceAccountKey, SheetsCredentials};
pub use memory::InMemoryTabularStore;
pub use sheets::{SheetsStoreConfig, SheetsTabularStore, SpreadsheetRef};
pub use store::{StorageError, StoreOp, TableHandle, TabularStore};
