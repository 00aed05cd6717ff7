//! Query filters and change reports for usage history.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Filters for [`SqliteStore::query_usage`](crate::SqliteStore::query_usage).
/// Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub directory: Option<PathBuf>,
    pub base_path: Option<PathBuf>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl QueryOptions {
    /// History of one directory.
    pub fn for_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
            ..Default::default()
        }
    }
}

/// Which size changes to report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeDirection {
    Increase,
    Decrease,
    #[default]
    Both,
}

/// Window and filters for [`SqliteStore::top_changers`](crate::SqliteStore::top_changers).
#[derive(Debug, Clone)]
pub struct TopChangerOptions {
    pub base_path: PathBuf,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub direction: ChangeDirection,
    /// Ignore directories whose absolute change is smaller than this.
    pub min_change_bytes: u64,
    pub limit: usize,
}

/// Growth or shrinkage of one directory across a window, from its first
/// and last sample in that window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryChange {
    pub directory: PathBuf,
    pub base_path: PathBuf,
    pub start_size: u64,
    pub end_size: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub change_bytes: i64,
    /// Percent change relative to the start size; zero when it started empty.
    pub change_percent: f64,
}
