#![forbid(unsafe_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use shopsync_contracts::{DataRowIndex, Record, RecordId, Table};
use shopsync_engines::locator;
use shopsync_os::{DeleteEngine, SyncError, UpsertEngine, UpsertOutcome};
use shopsync_storage::{InMemoryTabularStore, StoreOp, TableHandle, TabularStore};

struct Fixture {
    store: Arc<InMemoryTabularStore>,
    handle: TableHandle,
    upsert: UpsertEngine,
    delete: DeleteEngine,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryTabularStore::new());
    let handle = store.ensure_table_exists("Customers").unwrap();
    Fixture {
        upsert: UpsertEngine::new(store.clone(), "id"),
        delete: DeleteEngine::new(store.clone(), "id"),
        store,
        handle,
    }
}

fn record(v: Value) -> Record {
    Record::from_json(v).unwrap()
}

fn rows(values: &[&[&str]]) -> Vec<Vec<String>> {
    values
        .iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

fn table(f: &Fixture) -> Table {
    Table::from_store_rows("Customers", f.store.read_all_rows(&f.handle).unwrap())
}

fn find(f: &Fixture, id: &str) -> Option<DataRowIndex> {
    let t = table(f);
    let column = locator::identifier_column(&t, "id").unwrap()?;
    locator::find(&t, column, &RecordId::new(id).unwrap())
}

#[test]
fn at_sync_db_01_scenario_insert_extend_delete() {
    let f = fixture();
    f.upsert
        .upsert(&f.handle, &record(json!({"id": 1, "name": "A"})))
        .unwrap();
    assert_eq!(
        f.store.snapshot("Customers").unwrap(),
        rows(&[&["id", "name"], &["1", "A"]])
    );

    let report = f
        .upsert
        .upsert(&f.handle, &record(json!({"id": 1, "name": "B", "note": "x"})))
        .unwrap();
    assert_eq!(report.outcome, UpsertOutcome::Updated);
    assert!(report.header_changed);
    assert_eq!(
        f.store.snapshot("Customers").unwrap(),
        rows(&[&["id", "name", "note"], &["1", "B", "x"]])
    );

    let deleted = f.delete.delete(&f.handle, &RecordId::new("1").unwrap()).unwrap();
    assert!(deleted.deleted);
    assert_eq!(
        f.store.snapshot("Customers").unwrap(),
        rows(&[&["id", "name", "note"]])
    );
}

#[test]
fn at_sync_db_02_upsert_is_idempotent() {
    let f = fixture();
    let r = record(json!({"id": 42, "email": "a@b.c", "tags": ["vip"]}));
    f.upsert.upsert(&f.handle, &r).unwrap();
    let after_first = f.store.snapshot("Customers").unwrap();
    let second = f.upsert.upsert(&f.handle, &r).unwrap();
    assert_eq!(second.outcome, UpsertOutcome::Updated);
    assert!(!second.header_changed);
    assert_eq!(f.store.snapshot("Customers").unwrap(), after_first);
}

#[test]
fn at_sync_db_03_header_grows_monotonically() {
    let f = fixture();
    let sequence = [
        json!({"id": 1, "name": "A"}),
        json!({"id": 2, "email": "b@x"}),
        json!({"id": 1, "phone": "555"}),
        json!({"name": "C", "id": 3}),
    ];
    let mut previous: Vec<String> = Vec::new();
    for r in sequence {
        f.upsert.upsert(&f.handle, &record(r)).unwrap();
        let header = table(&f).header().to_vec();
        assert!(header.len() >= previous.len());
        assert_eq!(&header[..previous.len()], previous.as_slice());
        previous = header;
    }
    assert_eq!(previous, vec!["id", "name", "email", "phone"]);
}

#[test]
fn at_sync_db_04_new_identifier_is_findable_at_appended_row() {
    let f = fixture();
    f.upsert
        .upsert(&f.handle, &record(json!({"id": 1, "name": "A"})))
        .unwrap();
    let report = f
        .upsert
        .upsert(&f.handle, &record(json!({"id": "123", "name": "Z"})))
        .unwrap();
    assert_eq!(report.outcome, UpsertOutcome::Inserted);
    assert_eq!(report.row_index, DataRowIndex(1));
    assert_eq!(find(&f, "123"), Some(DataRowIndex(1)));
}

#[test]
fn at_sync_db_05_update_overwrites_without_duplicating() {
    let f = fixture();
    for id in 1..=6 {
        f.upsert
            .upsert(&f.handle, &record(json!({"id": id, "name": "orig", "city": "X"})))
            .unwrap();
    }
    f.upsert
        .upsert(&f.handle, &record(json!({"id": 5, "name": "new"})))
        .unwrap();
    let t = table(&f);
    let matches: Vec<&Vec<String>> = t.rows().iter().filter(|r| r[0] == "5").collect();
    assert_eq!(matches.len(), 1);
    let row = find(&f, "5").unwrap();
    // Last write wins per row: columns the new record omits are cleared.
    assert_eq!(t.padded_row(row).unwrap(), vec!["5", "new", ""]);
    assert_eq!(t.data_row_count(), 6);
}

#[test]
fn at_sync_db_06_delete_removes_exactly_one_row() {
    let f = fixture();
    for id in 1..=6 {
        f.upsert
            .upsert(&f.handle, &record(json!({"id": id, "name": format!("n{id}")})))
            .unwrap();
    }
    let before = table(&f).data_row_count();
    let report = f.delete.delete(&f.handle, &RecordId::new("5").unwrap()).unwrap();
    assert_eq!(report.row_index, Some(DataRowIndex(4)));
    assert_eq!(table(&f).data_row_count(), before - 1);
    assert_eq!(find(&f, "5"), None);
    assert_eq!(find(&f, "6"), Some(DataRowIndex(4)));

    let again = f.delete.delete(&f.handle, &RecordId::new("5").unwrap()).unwrap();
    assert!(!again.deleted);
    assert_eq!(table(&f).data_row_count(), before - 1);
}

#[test]
fn at_sync_db_07_numeric_ids_match_text_cells() {
    let f = fixture();
    f.store
        .seed_table("Customers", rows(&[&["id", "name"], &["77", "typed"]]))
        .unwrap();
    let report = f
        .upsert
        .upsert(&f.handle, &record(json!({"id": 77, "name": "webhook"})))
        .unwrap();
    assert_eq!(report.outcome, UpsertOutcome::Updated);
    assert_eq!(
        f.store.snapshot("Customers").unwrap(),
        rows(&[&["id", "name"], &["77", "webhook"]])
    );
}

#[test]
fn at_sync_db_08_nested_values_are_stored_as_json_text() {
    let f = fixture();
    f.upsert
        .upsert(
            &f.handle,
            &record(json!({"id": 1, "tags": ["a", "b"], "default_address": {"city": "Köln"}})),
        )
        .unwrap();
    let t = table(&f);
    let tags = t.cell(DataRowIndex(0), t.column_index("tags").unwrap());
    assert_eq!(tags, r#"["a","b"]"#);
    let parsed: Value = serde_json::from_str(tags).unwrap();
    assert_eq!(parsed, json!(["a", "b"]));
    assert_eq!(
        t.cell(DataRowIndex(0), t.column_index("default_address").unwrap()),
        r#"{"city":"Köln"}"#
    );
}

#[test]
fn at_sync_db_09_header_is_written_before_the_data_row() {
    let f = fixture();
    f.upsert
        .upsert(&f.handle, &record(json!({"id": 1, "name": "A"})))
        .unwrap();
    let ops: Vec<(StoreOp, Option<usize>)> = f
        .store
        .mutation_log()
        .into_iter()
        .map(|r| (r.op, r.row))
        .collect();
    assert_eq!(
        ops,
        vec![
            (StoreOp::EnsureTable, None),
            (StoreOp::WriteRowRange, Some(0)),
            (StoreOp::AppendRow, Some(1)),
        ]
    );
}

#[test]
fn at_sync_db_10_failed_row_write_leaves_only_header_and_recovers() {
    let f = fixture();
    f.store.fail_next(StoreOp::AppendRow);
    let err = f
        .upsert
        .upsert(&f.handle, &record(json!({"id": 1, "name": "A"})))
        .unwrap_err();
    assert!(matches!(err, SyncError::StoreUnavailable { .. }));
    assert!(err.is_retryable());
    assert_eq!(f.store.snapshot("Customers").unwrap(), rows(&[&["id", "name"]]));

    let retry = f
        .upsert
        .upsert(&f.handle, &record(json!({"id": 1, "name": "A"})))
        .unwrap();
    assert_eq!(retry.outcome, UpsertOutcome::Inserted);
    assert!(!retry.header_changed);
    assert_eq!(
        f.store.snapshot("Customers").unwrap(),
        rows(&[&["id", "name"], &["1", "A"]])
    );
}

#[test]
fn at_sync_db_11_header_without_identifier_is_schema_inconsistency() {
    let f = fixture();
    f.store
        .seed_table("Customers", rows(&[&["email", "name"], &["a@x", "A"]]))
        .unwrap();
    let err = f
        .upsert
        .upsert(&f.handle, &record(json!({"id": 1, "name": "A"})))
        .unwrap_err();
    assert!(matches!(err, SyncError::SchemaInconsistency { .. }));
    assert!(!err.is_retryable());
    assert_eq!(
        f.store.snapshot("Customers").unwrap(),
        rows(&[&["email", "name"], &["a@x", "A"]])
    );
}

#[test]
fn at_sync_db_12_short_rows_and_existing_columns_are_tolerated() {
    let f = fixture();
    f.store
        .seed_table(
            "Customers",
            rows(&[&["name", "notes", "id"], &["legacy"], &["B", "", "9"]]),
        )
        .unwrap();
    let report = f
        .upsert
        .upsert(&f.handle, &record(json!({"id": 9, "name": "B2"})))
        .unwrap();
    assert_eq!(report.row_index, DataRowIndex(1));
    assert_eq!(
        f.store.snapshot("Customers").unwrap(),
        rows(&[&["name", "notes", "id"], &["legacy"], &["B2", "", "9"]])
    );
}

#[test]
fn at_sync_db_13_duplicate_header_column_blocks_upsert() {
    let f = fixture();
    let seeded = rows(&[&["id", "name", "id"], &["1", "A", "1"]]);
    f.store.seed_table("Customers", seeded.clone()).unwrap();
    let before = f.store.mutation_log().len();
    let err = f
        .upsert
        .upsert(&f.handle, &record(json!({"id": 2, "name": "B"})))
        .unwrap_err();
    assert!(matches!(err, SyncError::SchemaInconsistency { .. }));
    assert_eq!(f.store.mutation_log().len(), before);
    assert_eq!(f.store.snapshot("Customers").unwrap(), seeded);
}

#[test]
fn at_sync_db_14_row_wider_than_header_blocks_delete() {
    let f = fixture();
    let seeded = rows(&[&["id", "name"], &["1", "A", "stray"]]);
    f.store.seed_table("Customers", seeded.clone()).unwrap();
    let err = f
        .delete
        .delete(&f.handle, &RecordId::new("1").unwrap())
        .unwrap_err();
    assert!(matches!(err, SyncError::SchemaInconsistency { .. }));
    assert!(!err.is_retryable());
    assert_eq!(f.store.snapshot("Customers").unwrap(), seeded);
}
