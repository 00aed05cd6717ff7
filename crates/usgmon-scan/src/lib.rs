//! Directory-size scanning engine for usgmon.
//!
//! A scan measures every directory exactly `depth` levels below a base path:
//!
//! - [`DirectoryEnumerator`] finds those directories, skipping excluded
//!   names and anything whose physical identity was already admitted, so
//!   symlink cycles terminate.
//! - A [`SizeStrategy`] measures one directory: the CephFS recursive-size
//!   attribute, `du -sb`, or a jwalk traversal, with [`AutoStrategy`]
//!   choosing per directory.
//! - [`Scanner`] runs a bounded pool of workers over the enumerated
//!   directories, either collecting everything or streaming results.
//!
//! # Example
//!
//! ```rust,no_run
//! use usgmon_scan::{ScanOptions, Scanner, StrategyKind};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), usgmon_scan::ScanError> {
//! let scanner = Scanner::with_kind(4, StrategyKind::Auto);
//! let scan = scanner
//!     .scan_path("/www/users".as_ref(), 1, &ScanOptions::default(), &CancellationToken::new())
//!     .await?;
//!
//! for result in &scan.results {
//!     println!("{}: {:?}", result.path.display(), result.size());
//! }
//! # Ok(())
//! # }
//! ```

mod enumerate;
mod inode;
mod scanner;
mod strategy;

pub use enumerate::{DirectoryEnumerator, ScanOptions};
pub use inode::InodeTracker;
pub use scanner::Scanner;
pub use strategy::{
    AutoStrategy, DuStrategy, SizeStrategy, WalkStrategy, XattrStrategy, build_strategy,
};

// Re-export core types for convenience
pub use usgmon_core::{BatchScan, MeasureError, ScanError, ScanResult, StrategyKind};
