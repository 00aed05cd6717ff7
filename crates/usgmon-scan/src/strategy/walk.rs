//! Sizing by walking the tree and summing file lengths.

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use jwalk::{Parallelism, WalkDir};
use tokio_util::sync::CancellationToken;

use usgmon_core::{FsIdentity, MeasureError};

use super::{SizeStrategy, resolve_target};
use crate::inode::InodeTracker;

/// Sums the apparent size of every non-directory entry in the subtree.
///
/// Symlinks inside the subtree are counted as links and never followed;
/// hardlinked files count once per measurement. Unreadable entries are
/// skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkStrategy;

impl WalkStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl SizeStrategy for WalkStrategy {
    fn name(&self) -> &'static str {
        "walk"
    }

    fn measure(&self, path: &Path, cancel: &CancellationToken) -> Result<u64, MeasureError> {
        let root = resolve_target(path)?;

        // Serial: the scan pipeline already runs one measurement per worker.
        let walker = WalkDir::new(&root)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .sort(false);

        let mut inode_tracker = InodeTracker::new();
        let mut total: u64 = 0;

        for entry in walker {
            let Ok(entry) = entry else {
                continue;
            };

            if entry.file_type().is_dir() {
                if cancel.is_cancelled() {
                    return Err(MeasureError::Cancelled);
                }
                continue;
            }

            let Ok(metadata) = entry.metadata() else {
                continue;
            };

            // Only count size for first hardlink
            if metadata.nlink() > 1 && !inode_tracker.track(FsIdentity::from_metadata(&metadata)) {
                continue;
            }

            total = total.saturating_add(metadata.len());
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();
        fs::create_dir(root.join("empty")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/.hidden"), "test").unwrap();

        temp
    }

    fn measure(path: &Path) -> Result<u64, MeasureError> {
        WalkStrategy::new().measure(path, &CancellationToken::new())
    }

    #[test]
    fn test_sums_file_sizes() {
        let temp = create_test_tree();
        assert_eq!(measure(temp.path()).unwrap(), 5 + 17 + 4);
        assert_eq!(measure(&temp.path().join("dir1")).unwrap(), 17 + 4);
    }

    #[test]
    fn test_empty_directory_is_zero() {
        let temp = create_test_tree();
        assert_eq!(measure(&temp.path().join("empty")).unwrap(), 0);
    }

    #[test]
    fn test_hardlinks_counted_once() {
        let temp = create_test_tree();
        fs::hard_link(temp.path().join("file1.txt"), temp.path().join("dir1/link.txt")).unwrap();
        assert_eq!(measure(temp.path()).unwrap(), 5 + 17 + 4);
    }

    #[test]
    fn test_internal_symlink_not_followed() {
        let temp = create_test_tree();
        let big = TempDir::new().unwrap();
        fs::write(big.path().join("big"), vec![0u8; 4096]).unwrap();
        std::os::unix::fs::symlink(big.path(), temp.path().join("empty/out")).unwrap();

        let size = measure(&temp.path().join("empty")).unwrap();
        assert!(size < 4096);
    }

    #[test]
    fn test_target_symlink_is_resolved() {
        let temp = create_test_tree();
        let link = temp.path().join("alias");
        std::os::unix::fs::symlink(temp.path().join("dir1"), &link).unwrap();
        assert_eq!(measure(&link).unwrap(), 17 + 4);
    }

    #[test]
    fn test_cancelled() {
        let temp = create_test_tree();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = WalkStrategy::new().measure(temp.path(), &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_missing_directory() {
        let temp = create_test_tree();
        let err = measure(&temp.path().join("gone")).unwrap_err();
        assert!(matches!(err, MeasureError::Resolve { .. }));
    }
}
