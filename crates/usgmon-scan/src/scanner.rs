//! Concurrent scan pipeline: enumerate, fan out to workers, collect results.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use usgmon_core::{BatchScan, MeasureError, ScanError, ScanResult, StrategyKind};

use crate::enumerate::{DirectoryEnumerator, ScanOptions};
use crate::strategy::{SizeStrategy, build_strategy};

/// Directory queue capacity, per worker.
const DIR_QUEUE_PER_WORKER: usize = 4;
/// Result queue capacity, per worker.
const RESULT_QUEUE_PER_WORKER: usize = 2;

/// Measures every directory at a fixed depth below a base path with a
/// bounded pool of workers.
///
/// At most `workers` measurements run at once. Each enumerated directory
/// yields exactly one [`ScanResult`] unless the scan is cancelled first.
#[derive(Clone)]
pub struct Scanner {
    workers: usize,
    strategy: Arc<dyn SizeStrategy>,
}

impl Scanner {
    /// Create a scanner. A worker count of zero is treated as one.
    pub fn new(workers: usize, strategy: Arc<dyn SizeStrategy>) -> Self {
        Self {
            workers: workers.max(1),
            strategy,
        }
    }

    /// Create a scanner for a configured strategy kind.
    pub fn with_kind(workers: usize, kind: StrategyKind) -> Self {
        Self::new(workers, build_strategy(kind))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Scan in batch mode: enumerate everything, measure it, and return all
    /// results once the workers finish.
    ///
    /// On cancellation no further directories are submitted, in-flight
    /// results are still collected, and the returned scan is flagged.
    pub async fn scan_path(
        &self,
        base: &Path,
        depth: u32,
        options: &ScanOptions,
        cancel: &CancellationToken,
    ) -> Result<BatchScan, ScanError> {
        if !check_base(base)? {
            return Ok(BatchScan::default());
        }

        let dirs = {
            let base = base.to_path_buf();
            let options = options.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                DirectoryEnumerator::new(&base, depth, &options).enumerate(&cancel)
            })
            .await
            .map_err(|e| ScanError::Task {
                message: e.to_string(),
            })?
        };
        debug!(path = %base.display(), depth, directories = dirs.len(), "Enumerated directories");

        let (dir_tx, dir_rx) = mpsc::channel(self.workers * DIR_QUEUE_PER_WORKER);
        let (result_tx, mut result_rx) = mpsc::channel(self.workers * RESULT_QUEUE_PER_WORKER);
        self.spawn_workers(dir_rx, result_tx, cancel.clone());

        let submit = async move {
            for dir in dirs {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = dir_tx.send(dir) => if sent.is_err() { break },
                }
            }
        };
        let collect = async {
            let mut results = Vec::new();
            while let Some(result) = result_rx.recv().await {
                results.push(result);
            }
            results
        };
        let ((), results) = tokio::join!(submit, collect);

        Ok(BatchScan {
            results,
            cancelled: cancel.is_cancelled(),
        })
    }

    /// Scan in streaming mode: results arrive on the returned channel while
    /// enumeration is still running. The channel closes once every
    /// enumerated directory has a result, or after cancellation.
    ///
    /// Dropping the receiver stops the scan. Must be called from within a
    /// Tokio runtime.
    pub fn scan_streaming(
        &self,
        base: &Path,
        depth: u32,
        options: &ScanOptions,
        cancel: &CancellationToken,
    ) -> Result<mpsc::Receiver<ScanResult>, ScanError> {
        let (result_tx, result_rx) = mpsc::channel(self.workers * RESULT_QUEUE_PER_WORKER);
        if !check_base(base)? {
            return Ok(result_rx);
        }

        let (dir_tx, dir_rx) = mpsc::channel(self.workers * DIR_QUEUE_PER_WORKER);
        {
            let base = base.to_path_buf();
            let options = options.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                DirectoryEnumerator::new(&base, depth, &options).stream(&cancel, dir_tx);
            });
        }
        self.spawn_workers(dir_rx, result_tx, cancel.clone());

        Ok(result_rx)
    }

    /// Start the worker pool. The result channel closes when the last worker
    /// exits, which happens once the directory channel is drained and closed,
    /// the scan is cancelled, or the result receiver is dropped.
    fn spawn_workers(
        &self,
        dirs: mpsc::Receiver<PathBuf>,
        results: mpsc::Sender<ScanResult>,
        cancel: CancellationToken,
    ) {
        let dirs = Arc::new(Mutex::new(dirs));

        for worker in 0..self.workers {
            let dirs = Arc::clone(&dirs);
            let results = results.clone();
            let strategy = Arc::clone(&self.strategy);
            let cancel = cancel.clone();

            tokio::spawn(async move {
                loop {
                    let next = {
                        let mut dirs = dirs.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            dir = dirs.recv() => dir,
                        }
                    };
                    let Some(dir) = next else {
                        break;
                    };

                    let result = measure(Arc::clone(&strategy), dir, cancel.clone()).await;
                    trace!(worker, path = %result.path.display(), ok = result.is_ok(), "Measured");
                    if results.send(result).await.is_err() {
                        break;
                    }
                }
            });
        }
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("workers", &self.workers)
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

/// Whether the base exists as a directory. A missing or unreadable base is
/// an error; a base that is not a directory simply has nothing to scan.
fn check_base(base: &Path) -> Result<bool, ScanError> {
    let metadata = std::fs::metadata(base).map_err(|e| ScanError::io(base, e))?;
    Ok(metadata.is_dir())
}

/// Run one strategy call on a blocking thread and time it.
async fn measure(
    strategy: Arc<dyn SizeStrategy>,
    dir: PathBuf,
    cancel: CancellationToken,
) -> ScanResult {
    let start = Instant::now();
    let task = {
        let dir = dir.clone();
        tokio::task::spawn_blocking(move || strategy.measure(&dir, &cancel))
    };
    let outcome = task.await.unwrap_or_else(|e| {
        Err(MeasureError::Task {
            message: e.to_string(),
        })
    });
    ScanResult::new(dir, outcome, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::WalkStrategy;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();
        fs::write(root.join("dir2/file4.txt"), "another file here").unwrap();

        temp
    }

    fn walk_scanner(workers: usize) -> Scanner {
        Scanner::new(workers, Arc::new(WalkStrategy::new()))
    }

    #[tokio::test]
    async fn test_basic_scan() {
        let temp = create_test_tree();
        let scanner = walk_scanner(2);

        let mut scan = scanner
            .scan_path(temp.path(), 1, &ScanOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        scan.sort_by_path();

        assert!(!scan.cancelled);
        assert_eq!(scan.results.len(), 2);
        assert_eq!(scan.results[0].path, temp.path().join("dir1"));
        assert_eq!(scan.results[0].size(), Some(17 + 4));
        assert_eq!(scan.results[1].size(), Some(17));
    }

    #[tokio::test]
    async fn test_depth_zero_measures_base() {
        let temp = create_test_tree();
        let scan = walk_scanner(1)
            .scan_path(temp.path(), 0, &ScanOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(scan.results.len(), 1);
        assert_eq!(scan.total_size(), 5 + 17 + 4 + 17);
    }

    #[tokio::test]
    async fn test_missing_base_is_an_error() {
        let temp = create_test_tree();
        let err = walk_scanner(1)
            .scan_path(
                &temp.path().join("missing"),
                1,
                &ScanOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_file_base_yields_nothing() {
        let temp = create_test_tree();
        let scanner = walk_scanner(1);
        let base = temp.path().join("file1.txt");

        let scan = scanner
            .scan_path(&base, 0, &ScanOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(scan.results.is_empty());

        let mut rx = scanner
            .scan_streaming(&base, 0, &ScanOptions::default(), &CancellationToken::new())
            .unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_streaming_closes_after_all_results() {
        let temp = create_test_tree();
        let mut rx = walk_scanner(3)
            .scan_streaming(temp.path(), 2, &ScanOptions::default(), &CancellationToken::new())
            .unwrap();

        let mut paths = Vec::new();
        while let Some(result) = rx.recv().await {
            paths.push(result.path);
        }
        assert_eq!(paths, vec![temp.path().join("dir1/subdir")]);
    }

    #[test]
    fn test_zero_workers_clamped() {
        assert_eq!(walk_scanner(0).workers(), 1);
        assert_eq!(walk_scanner(0).strategy_name(), "walk");
    }
}
