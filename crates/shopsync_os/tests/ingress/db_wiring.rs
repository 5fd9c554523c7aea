#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use shopsync_contracts::{Record, RecordCategory, RecordId, WebhookOperation};
use shopsync_engines::fetch::{FetchError, FetchOutcome, RecordFetcher};
use shopsync_os::ingress::{is_partial, parse_payload};
use shopsync_os::{
    RecordOutcome, SyncConfig, SyncError, SyncService, TableRoutingConfig, WebhookNotification,
};
use shopsync_storage::{InMemoryTabularStore, StoreOp};

#[derive(Default)]
struct StubFetcher {
    records: BTreeMap<String, Value>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl RecordFetcher for StubFetcher {
    fn fetch_full_record(
        &self,
        category: &RecordCategory,
        id: &RecordId,
    ) -> Result<FetchOutcome, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{}:{}", category, id));
        }
        if self.fail {
            return Err(FetchError::new("timeout", None, "stub timeout"));
        }
        if category.plural_key().is_none() {
            return Ok(FetchOutcome::Unsupported);
        }
        match self.records.get(id.as_str()) {
            Some(v) => Ok(FetchOutcome::Found(Record::from_json(v.clone()).unwrap())),
            None => Ok(FetchOutcome::NotFound),
        }
    }
}

fn service_with(
    fetcher: Option<Arc<dyn RecordFetcher>>,
) -> (Arc<InMemoryTabularStore>, SyncService) {
    let store = Arc::new(InMemoryTabularStore::new());
    let service = SyncService::new(SyncConfig::mvp_default(), store.clone(), fetcher);
    (store, service)
}

fn notification(category: &str, operation: WebhookOperation, body: Value) -> WebhookNotification {
    WebhookNotification {
        category: RecordCategory::from_route(category),
        operation,
        body,
    }
}

fn rows(values: &[&[&str]]) -> Vec<Vec<String>> {
    values
        .iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

#[test]
fn at_ingress_db_01_create_and_update_both_upsert_into_routed_table() {
    let (store, service) = service_with(None);
    let created = service
        .handle(notification(
            "customer",
            WebhookOperation::Create,
            json!({"id": 1, "email": "a@x"}),
        ))
        .unwrap();
    assert_eq!(created.table, "Customers");
    assert_eq!(
        created.outcomes,
        vec![RecordOutcome::Inserted {
            id: "1".to_string(),
            row_index: 0
        }]
    );
    let updated = service
        .handle(notification(
            "customer",
            WebhookOperation::Update,
            json!({"id": 1, "email": "b@x"}),
        ))
        .unwrap();
    assert_eq!(
        updated.outcomes,
        vec![RecordOutcome::Updated {
            id: "1".to_string(),
            row_index: 0
        }]
    );
    assert_eq!(
        store.snapshot("Customers").unwrap(),
        rows(&[&["id", "email"], &["1", "b@x"]])
    );
}

#[test]
fn at_ingress_db_02_malformed_notifications_touch_nothing() {
    let (store, service) = service_with(None);
    for body in [
        json!({"email": "a@x"}),
        json!([{"id": 1}]),
        json!({"id": null}),
        json!({"customers": [{"id": 1}, {"email": "no id"}]}),
        json!({"customers": {"id": 1}}),
    ] {
        let err = service
            .handle(notification("customer", WebhookOperation::Create, body))
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedPayload { .. }));
        assert!(!err.is_retryable());
    }
    let err = service
        .handle(notification("order", WebhookOperation::Delete, json!({})))
        .unwrap_err();
    assert!(matches!(err, SyncError::MalformedPayload { .. }));
    assert!(store.table_names().is_empty());
    assert!(store.mutation_log().is_empty());
}

#[test]
fn at_ingress_db_03_bulk_payload_applies_in_order() {
    let (store, service) = service_with(None);
    let report = service
        .handle(notification(
            "orders",
            WebhookOperation::Create,
            json!({"orders": [
                {"id": 10, "total_price": "5.00"},
                {"id": 11, "total_price": "7.50", "currency": "EUR"},
                {"id": 10, "total_price": "6.00"}
            ]}),
        ))
        .unwrap();
    assert!(report.bulk);
    assert_eq!(report.table, "Orders");
    let kinds: Vec<(&str, bool)> = report
        .outcomes
        .iter()
        .map(|o| (o.id(), matches!(o, RecordOutcome::Inserted { .. })))
        .collect();
    assert_eq!(kinds, vec![("10", true), ("11", true), ("10", false)]);
    assert_eq!(
        store.snapshot("Orders").unwrap(),
        rows(&[
            &["id", "total_price", "currency"],
            &["10", "6.00"],
            &["11", "7.50", "EUR"]
        ])
    );
}

#[test]
fn at_ingress_db_04_delete_uses_route_category_only() {
    let (store, service) = service_with(None);
    service
        .handle(notification("customer", WebhookOperation::Create, json!({"id": 5})))
        .unwrap();
    service
        .handle(notification("order", WebhookOperation::Create, json!({"id": 5})))
        .unwrap();
    let report = service
        .handle(notification("customer", WebhookOperation::Delete, json!({"id": "5"})))
        .unwrap();
    assert_eq!(
        report.outcomes,
        vec![RecordOutcome::Deleted {
            id: "5".to_string(),
            row_index: 0
        }]
    );
    assert_eq!(store.snapshot("Customers").unwrap(), rows(&[&["id"]]));
    assert_eq!(store.snapshot("Orders").unwrap(), rows(&[&["id"], &["5"]]));

    let again = service
        .handle(notification("customer", WebhookOperation::Delete, json!({"id": 5})))
        .unwrap();
    assert_eq!(
        again.outcomes,
        vec![RecordOutcome::NotPresent {
            id: "5".to_string()
        }]
    );
}

#[test]
fn at_ingress_db_05_unrecognized_category_falls_back_to_default_table() {
    let store = Arc::new(InMemoryTabularStore::new());
    let config = SyncConfig {
        identifier_field: "id".to_string(),
        routing: TableRoutingConfig {
            default_table: "Everything".to_string(),
            ..TableRoutingConfig::mvp_default()
        },
    };
    let service = SyncService::new(config, store.clone(), None);
    let report = service
        .handle(notification(
            "collection",
            WebhookOperation::Create,
            json!({"records": [{"id": 3, "title": "Summer"}]}),
        ))
        .unwrap();
    assert_eq!(report.table, "Everything");
    assert_eq!(
        store.snapshot("Everything").unwrap(),
        rows(&[&["id", "title"], &["3", "Summer"]])
    );
}

#[test]
fn at_ingress_db_06_partial_payload_is_completed_by_fetcher() {
    let mut records = BTreeMap::new();
    records.insert(
        "7".to_string(),
        json!({"id": 7, "email": "full@x", "tags": "vip"}),
    );
    let fetcher = Arc::new(StubFetcher {
        records,
        ..StubFetcher::default()
    });
    let (store, service) = service_with(Some(fetcher.clone()));
    assert!(service.fetch_enabled());

    let report = service
        .handle(notification(
            "customer",
            WebhookOperation::Update,
            json!({"id": 7, "admin_graphql_api_id": "gid://shopify/Customer/7"}),
        ))
        .unwrap();
    assert!(matches!(report.outcomes[0], RecordOutcome::Inserted { .. }));
    assert_eq!(
        store.snapshot("Customers").unwrap(),
        rows(&[&["id", "email", "tags"], &["7", "full@x", "vip"]])
    );

    // Complete payloads are written as received.
    service
        .handle(notification(
            "customer",
            WebhookOperation::Update,
            json!({"id": 7, "email": "inline@x"}),
        ))
        .unwrap();
    assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
}

#[test]
fn at_ingress_db_07_missing_source_record_is_skipped() {
    let fetcher = Arc::new(StubFetcher::default());
    let (store, service) = service_with(Some(fetcher));
    let report = service
        .handle(notification("product", WebhookOperation::Create, json!({"id": 99})))
        .unwrap();
    assert_eq!(
        report.outcomes,
        vec![RecordOutcome::SourceMissing {
            id: "99".to_string()
        }]
    );
    assert_eq!(store.snapshot("Products").unwrap_or_default(), Vec::<Vec<String>>::new());
}

#[test]
fn at_ingress_db_08_fetch_failure_is_retryable_and_writes_nothing() {
    let fetcher = Arc::new(StubFetcher {
        fail: true,
        ..StubFetcher::default()
    });
    let (store, service) = service_with(Some(fetcher));
    let err = service
        .handle(notification("order", WebhookOperation::Create, json!({"id": 1})))
        .unwrap_err();
    assert!(matches!(err, SyncError::StoreUnavailable { .. }));
    assert!(err.is_retryable());
    assert!(store.mutation_log().is_empty());
}

#[test]
fn at_ingress_db_09_store_outage_surfaces_as_unavailable() {
    let (store, service) = service_with(None);
    store.fail_next(StoreOp::ReadAllRows);
    let err = service
        .handle(notification("customer", WebhookOperation::Create, json!({"id": 1})))
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.kind(), "STORE_UNAVAILABLE");
}

#[test]
fn at_ingress_db_10_concurrent_upserts_keep_header_and_rows_consistent() {
    let (store, service) = service_with(None);
    let service = Arc::new(service);
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let service = service.clone();
            std::thread::spawn(move || {
                let field = format!("field_{}", i % 4);
                service
                    .handle(notification(
                        "customer",
                        WebhookOperation::Create,
                        json!({"id": i % 8, field: "v"}),
                    ))
                    .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let snapshot = store.snapshot("Customers").unwrap();
    let header = &snapshot[0];
    assert_eq!(header.len(), 5);
    assert_eq!(header[0], "id");
    assert_eq!(snapshot.len(), 1 + 8);
    let mut ids: Vec<&str> = snapshot[1..].iter().map(|r| r[0].as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
}

#[test]
fn at_ingress_db_11_payload_shape_helpers() {
    let parsed = parse_payload(
        &RecordCategory::Product,
        json!({"products": [{"id": 1}, {"id": "2", "title": "T"}]}),
        "id",
    )
    .unwrap();
    assert!(parsed.bulk);
    assert_eq!(parsed.records.len(), 2);
    assert_eq!(parsed.records[1].0.as_str(), "2");

    let partial = Record::from_json(json!({"id": 1, "admin_graphql_api_id": "gid"})).unwrap();
    let full = Record::from_json(json!({"id": 1, "title": "T"})).unwrap();
    assert!(is_partial(&partial, "id"));
    assert!(!is_partial(&full, "id"));
}

#[test]
fn at_ingress_db_12_unfetchable_category_keeps_payload_as_received() {
    let fetcher = Arc::new(StubFetcher::default());
    let (store, service) = service_with(Some(fetcher.clone()));
    let report = service
        .handle(notification("collection", WebhookOperation::Create, json!({"id": 3})))
        .unwrap();
    assert_eq!(report.table, "Sheet1");
    assert_eq!(
        report.outcomes,
        vec![RecordOutcome::Inserted {
            id: "3".to_string(),
            row_index: 0
        }]
    );
    assert_eq!(store.snapshot("Sheet1").unwrap(), rows(&[&["id"], &["3"]]));
    assert_eq!(
        fetcher.calls.lock().unwrap().as_slice(),
        &["collection:3".to_string()]
    );
}
