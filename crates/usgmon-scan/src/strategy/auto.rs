//! Per-directory strategy selection.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use usgmon_core::MeasureError;

use super::{DuStrategy, SizeStrategy, WalkStrategy, XattrStrategy, sys};

/// Picks a concrete strategy per directory: the CephFS attribute when the
/// directory is on CephFS, otherwise `du` when it is on `PATH`, otherwise
/// a walk.
#[derive(Debug, Clone)]
pub struct AutoStrategy {
    xattr: XattrStrategy,
    du: Option<DuStrategy>,
    walk: WalkStrategy,
}

impl AutoStrategy {
    pub fn new() -> Self {
        Self::with_du(DuStrategy::locate())
    }

    /// Use an explicit `du` (or none).
    pub fn with_du(du: Option<DuStrategy>) -> Self {
        Self {
            xattr: XattrStrategy::new(),
            du,
            walk: WalkStrategy::new(),
        }
    }

    /// The strategy that would measure `path` right now.
    pub fn strategy_for(&self, path: &Path) -> &dyn SizeStrategy {
        let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if sys::is_cephfs(&resolved) {
            &self.xattr
        } else if let Some(du) = &self.du {
            du
        } else {
            &self.walk
        }
    }
}

impl Default for AutoStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeStrategy for AutoStrategy {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn measure(&self, path: &Path, cancel: &CancellationToken) -> Result<u64, MeasureError> {
        let strategy = self.strategy_for(path);
        trace!(path = %path.display(), strategy = strategy.name(), "Selected size strategy");
        strategy.measure(path, cancel)
    }
}
