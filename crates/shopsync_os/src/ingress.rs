#![forbid(unsafe_code)]

use std::sync::Arc;

use serde_json::Value;
use shopsync_contracts::{Record, RecordCategory, RecordId, WebhookOperation};
use shopsync_engines::fetch::{FetchOutcome, RecordFetcher};
use shopsync_storage::TabularStore;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::delete::DeleteEngine;
use crate::error::SyncError;
use crate::gate::TableWriteGate;
use crate::router::TableRouter;
use crate::upsert::{UpsertEngine, UpsertOutcome};

/// Key that carries records in a bulk payload of a category with no plural key.
pub const BULK_FALLBACK_KEY: &str = "records";

/// Fields that by themselves do not describe a record.
const IDENTITY_ONLY_FIELDS: &[&str] = &["admin_graphql_api_id"];

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookNotification {
    pub category: RecordCategory,
    pub operation: WebhookOperation,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordOutcome {
    Inserted { id: String, row_index: usize },
    Updated { id: String, row_index: usize },
    Deleted { id: String, row_index: usize },
    NotPresent { id: String },
    SourceMissing { id: String },
}

impl RecordOutcome {
    pub fn id(&self) -> &str {
        match self {
            RecordOutcome::Inserted { id, .. }
            | RecordOutcome::Updated { id, .. }
            | RecordOutcome::Deleted { id, .. }
            | RecordOutcome::NotPresent { id }
            | RecordOutcome::SourceMissing { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationReport {
    pub table: String,
    pub bulk: bool,
    pub outcomes: Vec<RecordOutcome>,
}

/// Records carried by one notification, validated before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    pub bulk: bool,
    pub records: Vec<(RecordId, Record)>,
}

/// Accepts either a single record holding the identifier, or a mapping with a
/// sequence of such records under the category's plural key (or `records`).
/// One bad entry rejects the whole notification.
pub fn parse_payload(
    category: &RecordCategory,
    body: Value,
    identifier_field: &str,
) -> Result<ParsedPayload, SyncError> {
    let Value::Object(mut map) = body else {
        return Err(SyncError::malformed("notification body must be a JSON object"));
    };
    if map.contains_key(identifier_field) {
        let record = Record::from_json(Value::Object(map))?;
        let id = record.identifier(identifier_field)?;
        return Ok(ParsedPayload {
            bulk: false,
            records: vec![(id, record)],
        });
    }

    let bulk_key = category
        .plural_key()
        .filter(|key| map.contains_key(*key))
        .unwrap_or(BULK_FALLBACK_KEY);
    let Some(entries) = map.remove(bulk_key) else {
        return Err(SyncError::malformed(format!(
            "missing identifier field '{identifier_field}'"
        )));
    };
    let Value::Array(entries) = entries else {
        return Err(SyncError::malformed(format!(
            "bulk field '{bulk_key}' must be a sequence of records"
        )));
    };
    let mut records = Vec::with_capacity(entries.len());
    for (position, entry) in entries.into_iter().enumerate() {
        let record = Record::from_json(entry).map_err(|err| {
            SyncError::malformed(format!("{bulk_key}[{position}]: {err}"))
        })?;
        let id = record
            .identifier(identifier_field)
            .map_err(|err| SyncError::malformed(format!("{bulk_key}[{position}]: {err}")))?;
        records.push((id, record));
    }
    Ok(ParsedPayload {
        bulk: true,
        records,
    })
}

/// True when the record carries nothing but identity fields.
pub fn is_partial(record: &Record, identifier_field: &str) -> bool {
    record
        .field_names()
        .all(|name| name == identifier_field || IDENTITY_ONLY_FIELDS.contains(&name))
}

/// Applies webhook notifications to the routed table.
pub struct SyncService {
    config: SyncConfig,
    fetcher: Option<Arc<dyn RecordFetcher>>,
    router: TableRouter,
    gate: TableWriteGate,
    upsert: UpsertEngine,
    delete: DeleteEngine,
}

impl SyncService {
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn TabularStore>,
        fetcher: Option<Arc<dyn RecordFetcher>>,
    ) -> Self {
        Self {
            router: TableRouter::new(config.routing.clone(), store.clone()),
            gate: TableWriteGate::new(),
            upsert: UpsertEngine::new(store.clone(), config.identifier_field.clone()),
            delete: DeleteEngine::new(store, config.identifier_field.clone()),
            fetcher,
            config,
        }
    }

    pub fn fetch_enabled(&self) -> bool {
        self.fetcher.is_some()
    }

    pub fn handle(&self, notification: WebhookNotification) -> Result<NotificationReport, SyncError> {
        let WebhookNotification {
            category,
            operation,
            body,
        } = notification;
        let parsed = match parse_payload(&category, body, &self.config.identifier_field) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    category = category.as_str(),
                    operation = operation.as_str(),
                    error = %err,
                    "rejected notification"
                );
                return Err(err);
            }
        };
        if operation.is_upsert() {
            self.apply_upserts(&category, parsed)
        } else {
            self.apply_deletes(&category, parsed)
        }
    }

    fn apply_upserts(
        &self,
        category: &RecordCategory,
        parsed: ParsedPayload,
    ) -> Result<NotificationReport, SyncError> {
        // Fetches run before the table is locked so they can overlap with other writers.
        let mut prepared = Vec::with_capacity(parsed.records.len());
        for (id, record) in parsed.records {
            prepared.push((id.clone(), self.complete_record(category, &id, record)?));
        }

        let table = self.router.resolve(category)?;
        let mut outcomes = Vec::with_capacity(prepared.len());
        for (id, record) in prepared {
            let Some(record) = record else {
                outcomes.push(RecordOutcome::SourceMissing {
                    id: id.as_str().to_string(),
                });
                continue;
            };
            let report = self
                .gate
                .with_table(&table.name, || self.upsert.upsert(&table, &record))?;
            let id = id.as_str().to_string();
            outcomes.push(match report.outcome {
                UpsertOutcome::Inserted => RecordOutcome::Inserted {
                    id,
                    row_index: report.row_index.0,
                },
                UpsertOutcome::Updated => RecordOutcome::Updated {
                    id,
                    row_index: report.row_index.0,
                },
            });
        }
        Ok(NotificationReport {
            table: table.name,
            bulk: parsed.bulk,
            outcomes,
        })
    }

    fn apply_deletes(
        &self,
        category: &RecordCategory,
        parsed: ParsedPayload,
    ) -> Result<NotificationReport, SyncError> {
        let table = self.router.resolve(category)?;
        let mut outcomes = Vec::with_capacity(parsed.records.len());
        for (id, _) in parsed.records {
            let report = self
                .gate
                .with_table(&table.name, || self.delete.delete(&table, &id))?;
            let id = id.as_str().to_string();
            outcomes.push(match report.row_index {
                Some(row) if report.deleted => RecordOutcome::Deleted {
                    id,
                    row_index: row.0,
                },
                _ => RecordOutcome::NotPresent { id },
            });
        }
        Ok(NotificationReport {
            table: table.name,
            bulk: parsed.bulk,
            outcomes,
        })
    }

    /// `Ok(None)` when the payload was partial and the source no longer has the record.
    /// Categories the source cannot serve keep the payload as received.
    fn complete_record(
        &self,
        category: &RecordCategory,
        id: &RecordId,
        record: Record,
    ) -> Result<Option<Record>, SyncError> {
        let Some(fetcher) = self.fetcher.as_ref() else {
            return Ok(Some(record));
        };
        if !is_partial(&record, &self.config.identifier_field) {
            return Ok(Some(record));
        }
        debug!(category = category.as_str(), id = %id, "payload is partial, fetching full record");
        match fetcher.fetch_full_record(category, id)? {
            FetchOutcome::Found(mut full) => {
                if !full.contains_field(&self.config.identifier_field) {
                    full.insert(self.config.identifier_field.clone(), id.as_str());
                }
                Ok(Some(full))
            }
            FetchOutcome::NotFound => {
                info!(category = category.as_str(), id = %id, "source record not found, skipping");
                Ok(None)
            }
            FetchOutcome::Unsupported => {
                debug!(
                    category = category.as_str(),
                    id = %id,
                    "category has no source resource, writing payload as received"
                );
                Ok(Some(record))
            }
        }
    }
}
