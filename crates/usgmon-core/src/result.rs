//! Per-directory measurement results.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::MeasureError;

/// Outcome of measuring one directory during a scan.
///
/// Produced exactly once for every directory the enumerator admits.
#[derive(Debug)]
pub struct ScanResult {
    /// The measured directory, as enumerated (not resolved).
    pub path: PathBuf,
    /// Total size in bytes, or why it could not be measured.
    pub outcome: Result<u64, MeasureError>,
    /// Wall time spent in the size strategy.
    pub duration: Duration,
}

impl ScanResult {
    /// Create a new result.
    pub fn new(path: PathBuf, outcome: Result<u64, MeasureError>, duration: Duration) -> Self {
        Self {
            path,
            outcome,
            duration,
        }
    }

    /// Size in bytes if the measurement succeeded.
    pub fn size(&self) -> Option<u64> {
        self.outcome.as_ref().ok().copied()
    }

    /// The measurement error, if any.
    pub fn error(&self) -> Option<&MeasureError> {
        self.outcome.as_ref().err()
    }

    /// Check if the measurement succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Everything a batch-mode scan produced.
#[derive(Debug, Default)]
pub struct BatchScan {
    /// Results in completion order.
    pub results: Vec<ScanResult>,
    /// Set when the scan's token was cancelled before the scan returned;
    /// `results` may then cover only part of the enumerated directories.
    pub cancelled: bool,
}

impl BatchScan {
    /// Sort results by path, for callers that need a stable order.
    pub fn sort_by_path(&mut self) {
        self.results.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Number of results that carry a size.
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    /// Sum of all successfully measured sizes.
    pub fn total_size(&self) -> u64 {
        self.results.iter().filter_map(ScanResult::size).sum()
    }
}
