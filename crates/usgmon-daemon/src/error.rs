use thiserror::Error;

use usgmon_core::{ConfigError, ScanError};
use usgmon_store::StoreError;

/// Why a single scan ended without completing.
///
/// Terminal for that scan only; its path loop carries on at the next tick.
#[derive(Debug, Error)]
pub enum ScanFailure {
    /// The scan's cancellation token fired before it finished.
    #[error("Scan cancelled")]
    Cancelled,

    /// Writing to the usage store failed.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// The scan could not start.
    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl ScanFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors that prevent the daemon from being created.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}
