//! Persisted record types.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one scan execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(pub String);

impl ScanId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ScanId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One size measurement of one directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// The monitored base path the directory was found under.
    pub base_path: PathBuf,
    /// The measured directory.
    pub directory: PathBuf,
    /// Total size in bytes.
    pub size_bytes: u64,
    /// When the measurement was taken.
    pub recorded_at: DateTime<Utc>,
    /// The scan that produced it.
    pub scan_id: ScanId,
}

impl UsageRecord {
    /// Create a record stamped with the current time.
    pub fn now(base_path: &Path, directory: PathBuf, size_bytes: u64, scan_id: &ScanId) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            directory,
            size_bytes,
            recorded_at: Utc::now(),
            scan_id: scan_id.clone(),
        }
    }
}

/// Lifecycle state of a scan record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// The scan is in progress (or the process died during it).
    Running,
    /// Every enumerated directory was processed.
    Completed,
    /// The scan ended early; the reason is kept.
    Failed(String),
}

impl ScanStatus {
    /// Reason recorded for a cancelled scan.
    pub const CANCELLED: &'static str = "cancelled";

    /// Parse the stored status column.
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            other => Self::Failed(
                other
                    .strip_prefix("failed: ")
                    .unwrap_or(other)
                    .to_string(),
            ),
        }
    }

    /// Check if the scan was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Failed(reason) if reason == Self::CANCELLED)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// One scan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Scan identifier.
    pub scan_id: ScanId,
    /// Monitored base path.
    pub base_path: PathBuf,
    /// When the scan started.
    pub started_at: DateTime<Utc>,
    /// When the scan completed or failed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of usage records persisted by a completed scan.
    pub directories_scanned: u64,
    /// Lifecycle state.
    pub status: ScanStatus,
}
