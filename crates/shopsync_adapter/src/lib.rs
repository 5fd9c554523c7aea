#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value;
use shopsync_contracts::{RecordCategory, WebhookOperation};
use shopsync_engines::fetch::{RecordFetcher, ShopifyFetchConfig, ShopifyRecordFetcher};
use shopsync_os::{RecordOutcome, SyncConfig, SyncError, SyncService, WebhookNotification};
use shopsync_storage::{
    InMemoryTabularStore, SheetsStoreConfig, SheetsTabularStore, TabularStore,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sheets,
    Memory,
}

impl StoreBackend {
    pub fn parse(raw: Option<&str>) -> Result<Self, String> {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("sheets") => Ok(StoreBackend::Sheets),
            Some("memory") => Ok(StoreBackend::Memory),
            Some(other) => Err(format!(
                "invalid SHOPSYNC_STORE_BACKEND '{other}' (expected sheets or memory)"
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::Sheets => "sheets",
            StoreBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WebhookAdapterResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub table: Option<String>,
    pub records: Vec<RecordOutcome>,
}

impl WebhookAdapterResponse {
    pub fn rejected(outcome: &str, reason: String) -> Self {
        Self {
            status: "error".to_string(),
            outcome: outcome.to_string(),
            reason: Some(reason),
            table: None,
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub backend: String,
    pub fetch_enabled: bool,
}

/// Process-wide wiring: one store client, one optional fetcher, one sync service.
pub struct AdapterRuntime {
    service: SyncService,
    backend: &'static str,
}

impl AdapterRuntime {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn TabularStore>,
        fetcher: Option<Arc<dyn RecordFetcher>>,
    ) -> Self {
        let backend = store.backend_name();
        Self {
            service: SyncService::new(config, store, fetcher),
            backend,
        }
    }

    pub fn default_from_env() -> Result<Self, String> {
        let backend = StoreBackend::parse(env::var("SHOPSYNC_STORE_BACKEND").ok().as_deref())?;
        let store: Arc<dyn TabularStore> = match backend {
            StoreBackend::Sheets => {
                Arc::new(SheetsTabularStore::new(SheetsStoreConfig::from_env()?))
            }
            StoreBackend::Memory => Arc::new(InMemoryTabularStore::new()),
        };
        let fetcher: Option<Arc<dyn RecordFetcher>> = ShopifyFetchConfig::from_env()?
            .map(|config| Arc::new(ShopifyRecordFetcher::new(config)) as Arc<dyn RecordFetcher>);
        let config = SyncConfig::from_env();
        info!(
            backend = backend.as_str(),
            fetch_enabled = fetcher.is_some(),
            identifier_field = %config.identifier_field,
            "adapter runtime configured"
        );
        Ok(Self::new(config, store, fetcher))
    }

    pub fn health_report(&self) -> AdapterHealthResponse {
        AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            reason: None,
            backend: self.backend.to_string(),
            fetch_enabled: self.service.fetch_enabled(),
        }
    }

    /// Applies one webhook call. Blocking: run it off the async executor.
    pub fn run_webhook(
        &self,
        category: &str,
        operation: &str,
        body: Value,
    ) -> (StatusCode, WebhookAdapterResponse) {
        let Some(operation) = WebhookOperation::parse(operation) else {
            return (
                StatusCode::NOT_FOUND,
                WebhookAdapterResponse::rejected(
                    "REJECTED",
                    format!("unsupported webhook operation '{operation}'"),
                ),
            );
        };
        let category = RecordCategory::from_route(category);
        let notification = WebhookNotification {
            category: category.clone(),
            operation,
            body,
        };
        match self.service.handle(notification) {
            Ok(report) => {
                let outcome = if report.outcomes.is_empty() {
                    "NO_RECORDS"
                } else {
                    "APPLIED"
                };
                (
                    StatusCode::OK,
                    WebhookAdapterResponse {
                        status: "ok".to_string(),
                        outcome: outcome.to_string(),
                        reason: None,
                        table: Some(report.table),
                        records: report.outcomes,
                    },
                )
            }
            Err(err) => {
                let status = status_for_error(&err);
                warn!(
                    category = category.as_str(),
                    operation = operation.as_str(),
                    kind = err.kind(),
                    status = status.as_u16(),
                    error = %err,
                    "webhook not applied"
                );
                (
                    status,
                    WebhookAdapterResponse::rejected(err.kind(), err.to_string()),
                )
            }
        }
    }
}

/// Client errors are rejected outright. Transient store failures invite an
/// upstream retry; a store that refused the call does not.
pub fn status_for_error(err: &SyncError) -> StatusCode {
    match err {
        SyncError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
        SyncError::SchemaInconsistency { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SyncError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SyncError::StoreRejected { .. } => StatusCode::BAD_GATEWAY,
    }
}
