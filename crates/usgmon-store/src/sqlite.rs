//! SQLite-backed usage store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

use usgmon_core::{ScanId, ScanRecord, ScanStatus, UsageRecord};

use crate::query::{DirectoryChange, QueryOptions, TopChangerOptions};
use crate::{Result, StoreError, UsageStore};

const SCHEMA_VERSION: i64 = 1;

const USAGE_COLUMNS: &str = "base_path, directory, size_bytes, recorded_at, scan_id";

const TOP_CHANGERS_SQL: &str = "
    WITH ranked AS (
        SELECT
            directory,
            base_path,
            size_bytes,
            recorded_at,
            ROW_NUMBER() OVER (PARTITION BY directory ORDER BY recorded_at ASC) AS rn_first,
            ROW_NUMBER() OVER (PARTITION BY directory ORDER BY recorded_at DESC) AS rn_last
        FROM usage_records
        WHERE (base_path = ?1 OR base_path = ?1 || '/')
          AND recorded_at BETWEEN ?2 AND ?3
    ),
    changes AS (
        SELECT
            head.directory,
            head.base_path,
            head.size_bytes AS start_size,
            head.recorded_at AS start_time,
            tail.size_bytes AS end_size,
            tail.recorded_at AS end_time
        FROM ranked head
        JOIN ranked tail ON head.directory = tail.directory
        WHERE head.rn_first = 1 AND tail.rn_last = 1
    )
    SELECT
        directory, base_path, start_size, end_size, start_time, end_time,
        end_size - start_size AS change_bytes,
        CASE WHEN start_size > 0
             THEN ROUND(100.0 * (end_size - start_size) / start_size, 2)
             ELSE 0.0 END AS change_percent
    FROM changes
    WHERE ABS(end_size - start_size) >= ?4
      AND (?5 = 'both'
           OR (?5 = 'increase' AND end_size > start_size)
           OR (?5 = 'decrease' AND end_size < start_size))
    ORDER BY ABS(end_size - start_size) DESC, directory
    LIMIT ?6
";

/// Usage store over a single SQLite connection.
///
/// The connection sits behind a mutex, so writes from concurrent scans are
/// serialized; each batch is one transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file, creating its directory if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened usage database");
        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Usage records matching `options`, newest first.
    pub fn query_usage(&self, options: &QueryOptions) -> Result<Vec<UsageRecord>> {
        let mut sql = format!("SELECT {USAGE_COLUMNS} FROM usage_records WHERE 1=1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(directory) = &options.directory {
            sql.push_str(" AND directory = ?");
            args.push(Value::Text(path_text(directory)));
        }
        if let Some(base_path) = &options.base_path {
            sql.push_str(" AND base_path = ?");
            args.push(Value::Text(path_text(base_path)));
        }
        if let Some(since) = &options.since {
            sql.push_str(" AND recorded_at >= ?");
            args.push(Value::Text(format_time(since)));
        }
        if let Some(until) = &options.until {
            sql.push_str(" AND recorded_at <= ?");
            args.push(Value::Text(format_time(until)));
        }
        sql.push_str(" ORDER BY recorded_at DESC, id DESC");
        if let Some(limit) = options.limit {
            sql.push_str(" LIMIT ?");
            args.push(Value::Integer(limit as i64));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), usage_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Most recent record for a directory.
    pub fn latest_usage(&self, directory: &Path) -> Result<Option<UsageRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {USAGE_COLUMNS} FROM usage_records
                     WHERE directory = ?1
                     ORDER BY recorded_at DESC, id DESC
                     LIMIT 1"
                ),
                params![path_text(directory)],
                usage_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Look up one scan record.
    pub fn get_scan(&self, scan_id: &ScanId) -> Result<Option<ScanRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT scan_id, base_path, started_at, completed_at, directories_scanned, status
                 FROM scans WHERE scan_id = ?1",
                params![scan_id.as_str()],
                |row| {
                    Ok(ScanRecord {
                        scan_id: ScanId(row.get(0)?),
                        base_path: PathBuf::from(row.get::<_, String>(1)?),
                        started_at: time_at(row, 2)?,
                        completed_at: optional_time_at(row, 3)?,
                        directories_scanned: row.get::<_, i64>(4)? as u64,
                        status: ScanStatus::parse(&row.get::<_, String>(5)?),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Directories under a base path with the largest size change in a window.
    pub fn top_changers(&self, options: &TopChangerOptions) -> Result<Vec<DirectoryChange>> {
        let base_path = normalize_base(&options.base_path);

        let conn = self.conn()?;
        let mut stmt = conn.prepare(TOP_CHANGERS_SQL)?;
        let rows = stmt.query_map(
            params![
                base_path,
                format_time(&options.since),
                format_time(&options.until),
                options.min_change_bytes as i64,
                options.direction.to_string(),
                options.limit as i64,
            ],
            |row| {
                Ok(DirectoryChange {
                    directory: PathBuf::from(row.get::<_, String>(0)?),
                    base_path: PathBuf::from(row.get::<_, String>(1)?),
                    start_size: row.get::<_, i64>(2)? as u64,
                    end_size: row.get::<_, i64>(3)? as u64,
                    start_time: time_at(row, 4)?,
                    end_time: time_at(row, 5)?,
                    change_bytes: row.get(6)?,
                    change_percent: row.get(7)?,
                })
            },
        )?;

        let mut changes = Vec::new();
        for row in rows {
            changes.push(row?);
        }
        Ok(changes)
    }

    fn finish_scan(&self, scan_id: &ScanId, status: &ScanStatus, count: Option<u64>) -> Result<()> {
        let conn = self.conn()?;
        let changed = match count {
            Some(count) => conn.execute(
                "UPDATE scans SET completed_at = ?1, directories_scanned = ?2, status = ?3
                 WHERE scan_id = ?4",
                params![
                    format_time(&Utc::now()),
                    count as i64,
                    status.to_string(),
                    scan_id.as_str()
                ],
            )?,
            None => conn.execute(
                "UPDATE scans SET completed_at = ?1, status = ?2 WHERE scan_id = ?3",
                params![format_time(&Utc::now()), status.to_string(), scan_id.as_str()],
            )?,
        };

        if changed == 0 {
            return Err(StoreError::UnknownScan {
                scan_id: scan_id.to_string(),
            });
        }
        Ok(())
    }
}

impl UsageStore for SqliteStore {
    fn start_scan(&self, base_path: &Path) -> Result<ScanId> {
        let scan_id = ScanId::generate();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO scans (scan_id, base_path, started_at, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                scan_id.as_str(),
                path_text(base_path),
                format_time(&Utc::now()),
                ScanStatus::Running.to_string()
            ],
        )?;
        Ok(scan_id)
    }

    fn record_usage_batch(&self, records: &[UsageRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO usage_records ({USAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"
            ))?;
            for record in records {
                stmt.execute(params![
                    path_text(&record.base_path),
                    path_text(&record.directory),
                    record.size_bytes as i64,
                    format_time(&record.recorded_at),
                    record.scan_id.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn complete_scan(&self, scan_id: &ScanId, directories_scanned: u64) -> Result<()> {
        self.finish_scan(scan_id, &ScanStatus::Completed, Some(directories_scanned))
    }

    fn fail_scan(&self, scan_id: &ScanId, reason: &str) -> Result<()> {
        self.finish_scan(scan_id, &ScanStatus::Failed(reason.to_string()), None)
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Strip trailing separators, keeping a bare root intact.
fn normalize_base(path: &Path) -> String {
    let text = path_text(path);
    let trimmed = text.trim_end_matches('/');
    if trimmed.is_empty() && !text.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Fixed-width UTC timestamps, so text order matches time order.
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_time(idx, &row.get::<_, String>(idx)?)
}

fn optional_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|text| parse_time(idx, &text))
        .transpose()
}

fn usage_from_row(row: &Row<'_>) -> rusqlite::Result<UsageRecord> {
    Ok(UsageRecord {
        base_path: PathBuf::from(row.get::<_, String>(0)?),
        directory: PathBuf::from(row.get::<_, String>(1)?),
        size_bytes: row.get::<_, i64>(2)? as u64,
        recorded_at: time_at(row, 3)?,
        scan_id: ScanId(row.get(4)?),
    })
}
