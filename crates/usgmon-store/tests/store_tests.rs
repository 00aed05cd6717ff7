use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use usgmon_core::{ScanId, ScanStatus, UsageRecord};
use usgmon_store::{
    ChangeDirection, QueryOptions, SqliteStore, StoreError, TopChangerOptions, UsageStore,
};

const BASE: &str = "/www/users";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn record(scan_id: &ScanId, dir: &str, size: u64, at: DateTime<Utc>) -> UsageRecord {
    UsageRecord {
        base_path: PathBuf::from(BASE),
        directory: Path::new(BASE).join(dir),
        size_bytes: size,
        recorded_at: at,
        scan_id: scan_id.clone(),
    }
}

/// Two scans a day apart: alice grows, bob shrinks, carol is unchanged.
fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();

    let first = store.start_scan(Path::new(BASE)).unwrap();
    store
        .record_usage_batch(&[
            record(&first, "alice.com", 1_000, t0()),
            record(&first, "bob.com", 5_000, t0()),
            record(&first, "carol.com", 300, t0()),
        ])
        .unwrap();
    store.complete_scan(&first, 3).unwrap();

    let second = store.start_scan(Path::new(BASE)).unwrap();
    let later = t0() + Duration::days(1);
    store
        .record_usage_batch(&[
            record(&second, "alice.com", 4_000, later),
            record(&second, "bob.com", 2_000, later),
            record(&second, "carol.com", 300, later),
        ])
        .unwrap();
    store.complete_scan(&second, 3).unwrap();

    store
}

fn window() -> TopChangerOptions {
    TopChangerOptions {
        base_path: PathBuf::from(BASE),
        since: t0() - Duration::hours(1),
        until: t0() + Duration::days(2),
        direction: ChangeDirection::Both,
        min_change_bytes: 0,
        limit: 10,
    }
}

#[test]
fn test_scan_lifecycle() {
    let store = SqliteStore::open_in_memory().unwrap();
    let scan_id = store.start_scan(Path::new(BASE)).unwrap();

    let scan = store.get_scan(&scan_id).unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Running);
    assert_eq!(scan.base_path, PathBuf::from(BASE));
    assert!(scan.completed_at.is_none());

    store.complete_scan(&scan_id, 97).unwrap();
    let scan = store.get_scan(&scan_id).unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.directories_scanned, 97);
    assert!(scan.completed_at.is_some());
}

#[test]
fn test_fail_scan_keeps_reason() {
    let store = SqliteStore::open_in_memory().unwrap();
    let scan_id = store.start_scan(Path::new(BASE)).unwrap();
    store.fail_scan(&scan_id, ScanStatus::CANCELLED).unwrap();

    let scan = store.get_scan(&scan_id).unwrap().unwrap();
    assert!(scan.status.is_cancelled());
    assert_eq!(scan.status.to_string(), "failed: cancelled");
}

#[test]
fn test_unknown_scan() {
    let store = SqliteStore::open_in_memory().unwrap();
    let missing = ScanId::generate();

    assert!(matches!(
        store.complete_scan(&missing, 1),
        Err(StoreError::UnknownScan { .. })
    ));
    assert!(matches!(
        store.fail_scan(&missing, "boom"),
        Err(StoreError::UnknownScan { .. })
    ));
    assert!(store.get_scan(&missing).unwrap().is_none());
}

#[test]
fn test_empty_batch_is_noop() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.record_usage_batch(&[]).unwrap();
    assert!(store.query_usage(&QueryOptions::default()).unwrap().is_empty());
}

#[test]
fn test_batch_is_atomic() {
    let store = SqliteStore::open_in_memory().unwrap();
    let scan_id = store.start_scan(Path::new(BASE)).unwrap();
    let orphan = ScanId::generate();

    // The second record violates the scan foreign key, so neither lands.
    let err = store
        .record_usage_batch(&[
            record(&scan_id, "alice.com", 1, t0()),
            record(&orphan, "bob.com", 2, t0()),
        ])
        .unwrap_err();
    assert!(matches!(err, StoreError::Sqlite(_)));
    assert!(store.query_usage(&QueryOptions::default()).unwrap().is_empty());
}

#[test]
fn test_query_usage_newest_first() {
    let store = seeded_store();
    let alice = Path::new(BASE).join("alice.com");

    let history = store
        .query_usage(&QueryOptions::for_directory(&alice))
        .unwrap();
    let sizes: Vec<u64> = history.iter().map(|r| r.size_bytes).collect();
    assert_eq!(sizes, vec![4_000, 1_000]);
    assert_eq!(history[0].recorded_at, t0() + Duration::days(1));

    let limited = store
        .query_usage(&QueryOptions {
            base_path: Some(PathBuf::from(BASE)),
            limit: Some(2),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(limited.len(), 2);

    let since = store
        .query_usage(&QueryOptions {
            since: Some(t0() + Duration::hours(1)),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(since.len(), 3);

    let until = store
        .query_usage(&QueryOptions {
            until: Some(t0()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(until.len(), 3);
}

#[test]
fn test_latest_usage() {
    let store = seeded_store();
    let latest = store
        .latest_usage(&Path::new(BASE).join("bob.com"))
        .unwrap()
        .unwrap();
    assert_eq!(latest.size_bytes, 2_000);

    assert!(store.latest_usage(Path::new("/nowhere")).unwrap().is_none());
}

#[test]
fn test_top_changers_both_directions() {
    let store = seeded_store();
    let changes = store.top_changers(&window()).unwrap();

    let summary: Vec<(String, i64)> = changes
        .iter()
        .map(|c| {
            (
                c.directory.file_name().unwrap().to_string_lossy().into_owned(),
                c.change_bytes,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("alice.com".to_string(), 3_000),
            ("bob.com".to_string(), -3_000),
            ("carol.com".to_string(), 0),
        ]
    );

    let alice = &changes[0];
    assert_eq!(alice.start_size, 1_000);
    assert_eq!(alice.end_size, 4_000);
    assert_eq!(alice.start_time, t0());
    assert!((alice.change_percent - 300.0).abs() < f64::EPSILON);
}

#[test]
fn test_top_changers_filters() {
    let store = seeded_store();

    let growth = store
        .top_changers(&TopChangerOptions {
            direction: ChangeDirection::Increase,
            ..window()
        })
        .unwrap();
    assert_eq!(growth.len(), 1);
    assert_eq!(growth[0].change_bytes, 3_000);

    let shrink = store
        .top_changers(&TopChangerOptions {
            direction: ChangeDirection::Decrease,
            ..window()
        })
        .unwrap();
    assert_eq!(shrink.len(), 1);
    assert_eq!(shrink[0].change_bytes, -3_000);

    let significant = store
        .top_changers(&TopChangerOptions {
            min_change_bytes: 1,
            limit: 1,
            ..window()
        })
        .unwrap();
    assert_eq!(significant.len(), 1);

    let trailing = store
        .top_changers(&TopChangerOptions {
            base_path: PathBuf::from("/www/users/"),
            ..window()
        })
        .unwrap();
    assert_eq!(trailing.len(), 3);

    let outside = store
        .top_changers(&TopChangerOptions {
            since: t0() + Duration::days(3),
            until: t0() + Duration::days(4),
            ..window()
        })
        .unwrap();
    assert!(outside.is_empty());
}

#[test]
fn test_concurrent_writers() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let base = format!("/data/{i}");
                let scan_id = store.start_scan(Path::new(&base)).unwrap();
                for batch in 0..5 {
                    let records: Vec<_> = (0..10)
                        .map(|n| UsageRecord::now(
                            Path::new(&base),
                            PathBuf::from(format!("{base}/d{batch}-{n}")),
                            n,
                            &scan_id,
                        ))
                        .collect();
                    store.record_usage_batch(&records).unwrap();
                }
                store.complete_scan(&scan_id, 50).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.query_usage(&QueryOptions::default()).unwrap().len(), 200);
}

#[test]
fn test_open_creates_parent_directory() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested/dir/usgmon.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        let scan_id = store.start_scan(Path::new(BASE)).unwrap();
        store.complete_scan(&scan_id, 0).unwrap();
    }
    assert!(path.exists());

    // Reopening an existing database keeps its data.
    let store = SqliteStore::open(&path).unwrap();
    let scan_id = store.start_scan(Path::new(BASE)).unwrap();
    assert!(store.get_scan(&scan_id).unwrap().is_some());
}
