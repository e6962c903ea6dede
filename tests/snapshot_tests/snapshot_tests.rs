//! Tests for catalog snapshots
//!
//! These tests verify:
//! - Round-trip of tables, entities and typed values
//! - ETag continuity after reload
//! - Corruption detection (magic, checksum, truncation)
//! - open/close with a configured snapshot path

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tablekv::snapshot::{HEADER_SIZE, MAGIC};
use tablekv::{Config, DynamicEntity, EdmValue, TableCatalog, TableError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn populated_catalog() -> TableCatalog {
    let catalog = TableCatalog::default();

    let people = catalog.create_if_not_exists("people");
    people
        .insert(
            DynamicEntity::new("Harp", "Walter")
                .with_property("Email", "Walter@contoso.com")
                .with_property("Age", 41i64)
                .with_property("Score", 1.5)
                .with_property("Active", true)
                .with_property("Avatar", Bytes::from_static(b"\x00\x01\xff"))
                .with_property("Joined", Utc.with_ymd_and_hms(2020, 2, 29, 8, 30, 0).unwrap()),
        )
        .unwrap();
    people.insert(DynamicEntity::new("Smith", "Ben")).unwrap();

    catalog.create_if_not_exists("empty");
    catalog
}

// =============================================================================
// Round-trip Tests
// =============================================================================

#[test]
fn test_snapshot_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.snap");
    let catalog = populated_catalog();
    let original = catalog.get("people").unwrap().retrieve("Harp", "Walter").unwrap();

    catalog.save_snapshot(&path).unwrap();
    let loaded = TableCatalog::load_snapshot(Config::default(), &path).unwrap();

    assert_eq!(loaded.list_tables(), vec!["empty", "people"]);
    let people = loaded.get("people").unwrap();
    assert_eq!(people.count().unwrap(), 2);
    assert_eq!(people.retrieve("Harp", "Walter").unwrap(), original);
    assert!(loaded.get("empty").unwrap().is_empty().unwrap());
}

#[test]
fn test_snapshot_preserves_value_types() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.snap");
    populated_catalog().save_snapshot(&path).unwrap();

    let loaded = TableCatalog::load_snapshot(Config::default(), &path).unwrap();
    let walter = loaded.get("people").unwrap().retrieve("Harp", "Walter").unwrap();

    assert_eq!(walter.property("Age"), Some(&EdmValue::Int64(41)));
    assert_eq!(walter.property("Score"), Some(&EdmValue::Double(1.5)));
    assert_eq!(walter.property("Active"), Some(&EdmValue::Boolean(true)));
    assert_eq!(
        walter.property("Avatar"),
        Some(&EdmValue::Binary(Bytes::from_static(b"\x00\x01\xff")))
    );
    assert_eq!(
        walter.property("Joined").and_then(EdmValue::as_datetime),
        Some(Utc.with_ymd_and_hms(2020, 2, 29, 8, 30, 0).unwrap())
    );
}

#[test]
fn test_etags_stay_unique_after_reload() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.snap");
    let catalog = populated_catalog();
    let before = catalog.get("people").unwrap().retrieve("Smith", "Ben").unwrap();
    catalog.save_snapshot(&path).unwrap();

    let loaded = TableCatalog::load_snapshot(Config::default(), &path).unwrap();
    let people = loaded.get("people").unwrap();
    let fresh = people.insert(DynamicEntity::new("Jones", "Fred")).unwrap();

    assert_ne!(fresh.etag(), before.etag());

    // The reloaded ETag still guards updates
    let replaced = people
        .replace(DynamicEntity::new("Smith", "Ben"), before.etag())
        .unwrap();
    assert_ne!(replaced.etag(), before.etag());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_checksum_mismatch_is_detected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.snap");
    populated_catalog().save_snapshot(&path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[HEADER_SIZE] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let result = TableCatalog::load_snapshot(Config::default(), &path);
    assert!(matches!(result, Err(TableError::SnapshotCorruption(_))));
}

#[test]
fn test_bad_magic_is_detected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.snap");
    populated_catalog().save_snapshot(&path).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], MAGIC);
    bytes[0] = b'X';
    fs::write(&path, bytes).unwrap();

    let result = TableCatalog::load_snapshot(Config::default(), &path);
    assert!(matches!(result, Err(TableError::SnapshotCorruption(_))));
}

#[test]
fn test_truncated_file_is_detected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.snap");
    populated_catalog().save_snapshot(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    let result = TableCatalog::load_snapshot(Config::default(), &path);
    assert!(matches!(result, Err(TableError::SnapshotCorruption(_))));
}

#[test]
fn test_missing_file_is_io_error() {
    let temp = TempDir::new().unwrap();
    let result = TableCatalog::load_snapshot(Config::default(), &temp.path().join("absent.snap"));
    assert!(matches!(result, Err(TableError::Io(_))));
}

// =============================================================================
// Open / Close Tests
// =============================================================================

#[test]
fn test_open_without_snapshot_file_starts_empty() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .snapshot_path(temp.path().join("catalog.snap"))
        .build()
        .unwrap();

    let catalog = TableCatalog::open(config).unwrap();
    assert!(catalog.is_empty());
}

#[test]
fn test_close_then_open_restores_state() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("catalog.snap");
    let config = Config::builder().snapshot_path(&path).build().unwrap();

    let catalog = TableCatalog::open(config.clone()).unwrap();
    let people = catalog.create_if_not_exists("people");
    people.insert(DynamicEntity::new("Harp", "Walter")).unwrap();
    drop(people);
    catalog.close().unwrap();

    assert!(path.exists());

    let reopened = TableCatalog::open(config).unwrap();
    assert!(reopened.exists("people"));
    assert!(reopened.get("people").unwrap().retrieve("Harp", "Walter").is_ok());
}

#[test]
fn test_deleted_tables_are_not_saved() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.snap");
    let catalog = populated_catalog();
    catalog.delete_if_exists("people");

    catalog.save_snapshot(&path).unwrap();
    let loaded = TableCatalog::load_snapshot(Config::default(), &path).unwrap();

    assert_eq!(loaded.list_tables(), vec!["empty"]);
}

#[test]
fn test_save_skips_tables_deleted_concurrently() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.snap");
    let catalog = Arc::new(populated_catalog());
    let stop = Arc::new(AtomicBool::new(false));

    let churn = {
        let catalog = Arc::clone(&catalog);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let scratch = catalog.create_if_not_exists("scratch");
                let _ = scratch.insert(DynamicEntity::new("p", "r"));
                catalog.delete_if_exists("scratch");
            }
        })
    };

    for _ in 0..200 {
        catalog.save_snapshot(&path).unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    churn.join().unwrap();

    let loaded = TableCatalog::load_snapshot(Config::default(), &path).unwrap();
    assert!(loaded.exists("people"));
    assert_eq!(loaded.get("people").unwrap().count().unwrap(), 2);
}

#[test]
fn test_recreated_table_after_reload_rejects_old_etag() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.snap");
    let catalog = TableCatalog::default();
    let old = catalog
        .create_if_not_exists("people")
        .insert(DynamicEntity::new("Smith", "Ben"))
        .unwrap();
    catalog.delete_if_exists("people");
    catalog.save_snapshot(&path).unwrap();

    let loaded = TableCatalog::load_snapshot(Config::default(), &path).unwrap();
    let fresh = loaded
        .create_if_not_exists("people")
        .insert(DynamicEntity::new("Smith", "Ben"))
        .unwrap();

    assert_ne!(old.etag(), fresh.etag());
}
