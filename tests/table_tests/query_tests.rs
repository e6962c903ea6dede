//! Tests for queries
//!
//! These tests verify:
//! - RowKey range bounds within a partition
//! - Projection of property subsets
//! - Paged iteration, continuation and per-partition consistency
//! - Restart, take and cancellation
//! - Behaviour when the table is deleted mid-scan

use std::ops::Bound;

use tablekv::{
    CancellationToken, Config, DynamicEntity, Result, Table, TableBatchOperation, TableCatalog,
    TableError, TableQuery,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_table() -> Table {
    Table::new("people", Config::default())
}

fn setup_table_with_page_size(size: usize) -> Table {
    let config = Config::builder().query_page_size(size).build().unwrap();
    Table::new("people", config)
}

fn customer(last: &str, first: &str) -> DynamicEntity {
    DynamicEntity::new(last, first)
        .with_property("Email", format!("{}@contoso.com", first))
        .with_property("PhoneNumber", "425-555-0100")
}

fn row_keys(iter: impl Iterator<Item = Result<DynamicEntity>>) -> Vec<String> {
    iter.map(|e| e.unwrap().row_key().to_string()).collect()
}

fn setup_smiths(table: &Table) {
    table.insert(customer("Smith", "Jeff")).unwrap();
    table.insert(customer("Smith", "Ben")).unwrap();
}

// =============================================================================
// Range Query Tests
// =============================================================================

#[test]
fn test_range_query_upper_exclusive() {
    let table = setup_table();
    setup_smiths(&table);

    let rows = row_keys(table.range_query("Smith", Bound::Unbounded, Bound::Excluded("E")));

    assert_eq!(rows, vec!["Ben"]);
}

#[test]
fn test_range_query_stays_in_partition() {
    let table = setup_table();
    setup_smiths(&table);
    table.insert(customer("Smithers", "Al")).unwrap();
    table.insert(customer("Harp", "Walter")).unwrap();

    let rows = row_keys(table.range_query("Smith", Bound::Unbounded, Bound::Unbounded));

    assert_eq!(rows, vec!["Ben", "Jeff"]);
}

#[test]
fn test_range_query_inclusive_flags() {
    let table = setup_table();
    for name in ["a", "b", "c", "d"] {
        table.insert(customer("p", name)).unwrap();
    }

    let inclusive = row_keys(table.range_query("p", Bound::Included("b"), Bound::Included("c")));
    let exclusive = row_keys(table.range_query("p", Bound::Excluded("b"), Bound::Excluded("d")));
    let lower_only = row_keys(table.range_query("p", Bound::Included("c"), Bound::Unbounded));

    assert_eq!(inclusive, vec!["b", "c"]);
    assert_eq!(exclusive, vec!["c"]);
    assert_eq!(lower_only, vec!["c", "d"]);
}

#[test]
fn test_range_query_inverted_bounds_is_empty() {
    let table = setup_table();
    setup_smiths(&table);

    let rows = row_keys(table.range_query("Smith", Bound::Included("Z"), Bound::Included("A")));
    let same_excluded = row_keys(table.range_query("Smith", Bound::Excluded("Ben"), Bound::Excluded("Ben")));

    assert!(rows.is_empty());
    assert!(same_excluded.is_empty());
}

#[test]
fn test_range_query_missing_partition_is_empty() {
    let table = setup_table();
    setup_smiths(&table);

    assert_eq!(table.range_query("Jones", Bound::Unbounded, Bound::Unbounded).count(), 0);
}

#[test]
fn test_scan_orders_by_partition_then_row() {
    let table = setup_table();
    table.insert(customer("Smith", "Jeff")).unwrap();
    table.insert(customer("Harp", "Walter")).unwrap();
    table.insert(customer("Smith", "Ben")).unwrap();
    table.insert(customer("Jones", "Fred")).unwrap();

    let keys: Vec<(String, String)> = table
        .scan()
        .map(|e| {
            let e = e.unwrap();
            (e.partition_key().to_string(), e.row_key().to_string())
        })
        .collect();

    assert_eq!(
        keys,
        vec![
            ("Harp".to_string(), "Walter".to_string()),
            ("Jones".to_string(), "Fred".to_string()),
            ("Smith".to_string(), "Ben".to_string()),
            ("Smith".to_string(), "Jeff".to_string()),
        ]
    );
}

#[test]
fn test_row_bounds_without_partition_apply_everywhere() {
    let table = setup_table();
    table.insert(customer("a", "1")).unwrap();
    table.insert(customer("a", "5")).unwrap();
    table.insert(customer("b", "2")).unwrap();
    table.insert(customer("b", "9")).unwrap();

    let rows = row_keys(table.query(TableQuery::new().row_key_le("5")));

    assert_eq!(rows, vec!["1", "5", "2"]);
}

// =============================================================================
// Projection Tests
// =============================================================================

#[test]
fn test_project_emails_in_row_order() {
    let table = setup_table();
    setup_smiths(&table);

    let emails: Vec<String> = table
        .project(Some("Smith"), Bound::Unbounded, Bound::Unbounded, ["Email"])
        .map(|e| e.unwrap().string_property("Email").unwrap().to_string())
        .collect();

    assert_eq!(emails, vec!["Ben@contoso.com", "Jeff@contoso.com"]);
}

#[test]
fn test_projection_drops_unrequested_properties() {
    let table = setup_table();
    setup_smiths(&table);

    for entity in table.project(Some("Smith"), Bound::Unbounded, Bound::Unbounded, ["Email"]) {
        let entity = entity.unwrap();
        assert_eq!(entity.properties().len(), 1);
        assert!(entity.property("PhoneNumber").is_none());
        // System fields are always present
        assert!(entity.etag().is_some());
        assert!(entity.timestamp().is_some());
    }
}

#[test]
fn test_projection_omits_missing_properties() {
    let table = setup_table();
    table.insert(customer("p", "with")).unwrap();
    table.insert(DynamicEntity::new("p", "without")).unwrap();

    let projected: Vec<DynamicEntity> = table
        .query(TableQuery::new().partition("p").select(["Email", "Nickname"]))
        .collect::<Result<_>>()
        .unwrap();

    assert_eq!(projected.len(), 2);
    assert_eq!(projected[0].properties().len(), 1);
    assert!(projected[1].properties().is_empty());
}

// =============================================================================
// Paging Tests
// =============================================================================

#[test]
fn test_paged_scan_crosses_partitions() {
    let table = setup_table_with_page_size(2);
    for p in ["a", "b", "c"] {
        for r in ["1", "2", "3"] {
            table.insert(customer(p, r)).unwrap();
        }
    }

    let keys: Vec<String> = table
        .scan()
        .map(|e| e.unwrap().key().to_string())
        .collect();

    assert_eq!(keys.len(), 9);
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_scan_never_sees_half_a_batch() {
    let table = setup_table_with_page_size(1);
    table.insert(customer("p", "b")).unwrap();
    table.insert(customer("p", "c")).unwrap();

    let mut iter = table.scan();
    assert_eq!(iter.next().unwrap().unwrap().row_key(), "b");

    // Commits between yielded elements of the same partition
    let current_b = table.retrieve("p", "b").unwrap();
    let mut batch = TableBatchOperation::new();
    batch.delete(&current_b);
    batch.insert(customer("p", "d"));
    table.execute_batch(&batch).unwrap();

    // The partition was read whole: the rest reflects the state before the batch
    assert_eq!(row_keys(iter), vec!["c"]);
    assert_eq!(row_keys(table.scan()), vec!["c", "d"]);
}

#[test]
fn test_page_holds_whole_partition() {
    let table = setup_table_with_page_size(2);
    for r in ["1", "2", "3", "4", "5"] {
        table.insert(customer("a", r)).unwrap();
    }
    table.insert(customer("b", "1")).unwrap();

    let mut iter = table.scan();
    assert_eq!(iter.next().unwrap().unwrap().row_key(), "1");

    // The first page ended at the partition boundary, not after two rows
    assert_eq!(
        iter.continuation().map(|k| (k.partition_key(), k.row_key())),
        Some(("a", "5"))
    );
    assert_eq!(iter.count(), 5);
}

#[test]
fn test_later_partitions_observe_writes() {
    let table = setup_table_with_page_size(1);
    table.insert(customer("a", "1")).unwrap();
    table.insert(customer("c", "1")).unwrap();

    let mut iter = table.scan();
    assert_eq!(iter.next().unwrap().unwrap().partition_key(), "a");

    // Ahead of the continuation partition: visible. Behind it: not revisited.
    table.insert(customer("b", "1")).unwrap();
    table.insert(customer("a", "0")).unwrap();

    let rest: Vec<String> = iter.map(|e| e.unwrap().partition_key().to_string()).collect();
    assert_eq!(rest, vec!["b", "c"]);
}

#[test]
fn test_restart_reads_current_state() {
    let table = setup_table();
    setup_smiths(&table);

    let mut iter = table.range_query("Smith", Bound::Unbounded, Bound::Unbounded);
    assert_eq!(iter.by_ref().count(), 2);
    assert!(iter.next().is_none());

    table.insert(customer("Smith", "Anna")).unwrap();
    iter.restart();

    assert_eq!(row_keys(iter), vec!["Anna", "Ben", "Jeff"]);
}

#[test]
fn test_take_limits_results() {
    let table = setup_table_with_page_size(3);
    for i in 0..10 {
        table.insert(customer("p", &format!("{:02}", i))).unwrap();
    }

    let rows = row_keys(table.query(TableQuery::new().partition("p").row_key_gt("03").take(4)));

    assert_eq!(rows, vec!["04", "05", "06", "07"]);
}

#[test]
fn test_query_is_reusable() {
    let table = setup_table();
    setup_smiths(&table);

    let query = TableQuery::new().partition("Smith").row_key_lt("E");
    assert_eq!(row_keys(table.query(query.clone())), vec!["Ben"]);
    assert_eq!(row_keys(table.query(query)), vec!["Ben"]);
}

// =============================================================================
// Cancellation / Failure Tests
// =============================================================================

#[test]
fn test_cancel_between_elements() {
    let table = setup_table();
    setup_smiths(&table);
    let token = CancellationToken::new();

    let mut iter = table.scan().with_cancellation(token.clone());
    assert!(iter.next().unwrap().is_ok());

    token.cancel();

    assert!(matches!(iter.next(), Some(Err(TableError::Cancelled))));
    assert!(iter.next().is_none());
}

#[test]
fn test_table_deleted_mid_scan() {
    let catalog = TableCatalog::new(Config::builder().query_page_size(1).build().unwrap());
    let table = catalog.create_if_not_exists("people");
    table.insert(customer("Harp", "Walter")).unwrap();
    setup_smiths(&table);

    let mut iter = table.scan();
    assert!(iter.next().unwrap().is_ok());

    catalog.delete_if_exists("people");

    assert!(matches!(iter.next(), Some(Err(TableError::TableNotFound(_)))));
    assert!(iter.next().is_none());
}
