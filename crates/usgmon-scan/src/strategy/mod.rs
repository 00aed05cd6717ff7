//! Size strategies: interchangeable ways of measuring one directory.

mod auto;
mod du;
pub(crate) mod sys;
mod walk;
mod xattr;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use usgmon_core::{MeasureError, StrategyKind};

pub use auto::AutoStrategy;
pub use du::DuStrategy;
pub use walk::WalkStrategy;
pub use xattr::XattrStrategy;

/// Measures the total size in bytes of one directory subtree.
///
/// Implementations are blocking and are called from worker threads, so they
/// must be shareable. `cancel` is advisory: a strategy may check it and
/// return [`MeasureError::Cancelled`], or finish its current measurement.
///
/// Every strategy measures the directory the given path resolves to; a
/// symlink naming the directory is followed, symlinks inside it are not.
pub trait SizeStrategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Measure `path`. Failures are local to this directory.
    fn measure(&self, path: &Path, cancel: &CancellationToken) -> Result<u64, MeasureError>;
}

/// Build the strategy for a configured kind.
pub fn build_strategy(kind: StrategyKind) -> Arc<dyn SizeStrategy> {
    match kind {
        StrategyKind::Auto => Arc::new(AutoStrategy::new()),
        StrategyKind::Xattr => Arc::new(XattrStrategy::new()),
        StrategyKind::Du => Arc::new(DuStrategy::default()),
        StrategyKind::Walk => Arc::new(WalkStrategy::new()),
    }
}

/// Resolve the directory a (possibly symlinked) path names.
fn resolve_target(path: &Path) -> Result<PathBuf, MeasureError> {
    std::fs::canonicalize(path).map_err(|source| MeasureError::Resolve {
        path: path.to_path_buf(),
        source,
    })
}
