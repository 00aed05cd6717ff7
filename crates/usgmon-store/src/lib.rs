//! Usage history persistence for usgmon.
//!
//! [`UsageStore`] is the contract the scan orchestrator writes through;
//! [`SqliteStore`] implements it and adds the history queries used by the
//! command line.

mod error;
mod query;
mod sqlite;

pub use error::{Result, StoreError};
pub use query::{ChangeDirection, DirectoryChange, QueryOptions, TopChangerOptions};
pub use sqlite::SqliteStore;

use std::path::Path;

use usgmon_core::{ScanId, UsageRecord};

/// Durable sink for scan lifecycles and usage records.
///
/// Calls block; async callers should run them on a blocking thread.
/// Implementations must tolerate concurrent calls from independent scans.
pub trait UsageStore: Send + Sync {
    /// Open a scan record in the running state.
    fn start_scan(&self, base_path: &Path) -> Result<ScanId>;

    /// Persist a batch of records atomically. An empty batch is a no-op.
    fn record_usage_batch(&self, records: &[UsageRecord]) -> Result<()>;

    /// Mark a scan completed with the number of records it persisted.
    fn complete_scan(&self, scan_id: &ScanId, directories_scanned: u64) -> Result<()>;

    /// Mark a scan failed with a reason.
    fn fail_scan(&self, scan_id: &ScanId, reason: &str) -> Result<()>;
}
