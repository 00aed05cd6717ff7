//! Scan orchestration for usgmon.
//!
//! [`Daemon`] runs one loop per monitored path. Each tick streams a scan
//! through the [`usgmon_scan::Scanner`], writes successful results to a
//! [`usgmon_store::UsageStore`] in fixed-size batches, and records how the
//! scan ended. In-flight scans are tracked in [`ActiveScans`] so shutdown
//! can wait for them, within a bound.

mod daemon;
mod error;
mod registry;

pub use daemon::{Daemon, DaemonOptions, ScanOutcome};
pub use error::{DaemonError, ScanFailure};
pub use registry::{ActiveScanGuard, ActiveScans};
