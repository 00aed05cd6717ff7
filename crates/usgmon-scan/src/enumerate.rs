//! Depth-limited directory enumeration.

use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use usgmon_core::{FsIdentity, MonitoredPath, ScanError};

use crate::inode::InodeTracker;

/// Per-path enumeration settings.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Descend through symlinks that resolve to directories.
    pub follow_symlinks: bool,
    exclude: GlobSet,
}

impl ScanOptions {
    /// Compile options from a symlink policy and glob exclusion patterns.
    pub fn new(follow_symlinks: bool, exclude: &[String]) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let exclude = builder.build().map_err(|e| ScanError::InvalidPattern {
            pattern: exclude.join(","),
            message: e.to_string(),
        })?;

        Ok(Self {
            follow_symlinks,
            exclude,
        })
    }

    /// Options for a configured monitored path.
    pub fn for_path(path: &MonitoredPath) -> Result<Self, ScanError> {
        Self::new(path.follow_symlinks, &path.exclude)
    }

    /// Check whether an entry is excluded, by file name or by its path
    /// relative to the base.
    pub fn is_excluded(&self, base: &Path, path: &Path) -> bool {
        if self.exclude.is_empty() {
            return false;
        }
        if path
            .file_name()
            .is_some_and(|name| self.exclude.is_match(name))
        {
            return true;
        }
        path.strip_prefix(base)
            .is_ok_and(|relative| self.exclude.is_match(relative))
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            exclude: GlobSet::empty(),
        }
    }
}

/// Finds the directories exactly `depth` levels below a base path.
///
/// Every admitted directory has a distinct physical identity; the base's
/// identity is claimed first so a link back to it is never admitted.
pub struct DirectoryEnumerator<'a> {
    base: &'a Path,
    depth: u32,
    options: &'a ScanOptions,
    visited: InodeTracker,
}

impl<'a> DirectoryEnumerator<'a> {
    pub fn new(base: &'a Path, depth: u32, options: &'a ScanOptions) -> Self {
        Self {
            base,
            depth,
            options,
            visited: InodeTracker::new(),
        }
    }

    /// Enumerate eagerly. Stops early on cancellation and returns what was
    /// found so far.
    pub fn enumerate(mut self, cancel: &CancellationToken) -> Vec<PathBuf> {
        let mut found = Vec::new();
        self.run(cancel, |dir| {
            found.push(dir);
            ControlFlow::Continue(())
        });
        found
    }

    /// Enumerate into a channel. The sender is dropped (closing the channel)
    /// when enumeration finishes, is cancelled, or the receiver goes away.
    ///
    /// Blocks on a full channel, so run this on a blocking thread.
    pub fn stream(mut self, cancel: &CancellationToken, tx: mpsc::Sender<PathBuf>) {
        self.run(cancel, |dir| {
            if tx.blocking_send(dir).is_err() || cancel.is_cancelled() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
    }

    fn run(&mut self, cancel: &CancellationToken, mut emit: impl FnMut(PathBuf) -> ControlFlow<()>) {
        let base_identity = match fs::metadata(self.base) {
            Ok(meta) if meta.is_dir() => FsIdentity::from_metadata(&meta),
            Ok(_) => return,
            Err(err) => {
                debug!(path = %self.base.display(), error = %err, "Base path unavailable");
                return;
            }
        };
        self.visited.track(base_identity);

        if self.depth == 0 {
            let _ = emit(self.base.to_path_buf());
            return;
        }

        let mut level = vec![self.base.to_path_buf()];
        for _ in 1..self.depth {
            let mut next = Vec::new();
            for dir in &level {
                if cancel.is_cancelled() {
                    return;
                }
                self.children(dir, |child| {
                    next.push(child);
                    ControlFlow::Continue(())
                });
            }
            if next.is_empty() {
                return;
            }
            level = next;
        }

        for dir in &level {
            if cancel.is_cancelled() {
                return;
            }
            if self.children(dir, &mut emit).is_break() {
                return;
            }
        }
    }

    /// Visit the admissible child directories of `dir`.
    fn children(
        &mut self,
        dir: &Path,
        mut visit: impl FnMut(PathBuf) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "Skipping unreadable directory");
                return ControlFlow::Continue(());
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if self.options.is_excluded(self.base, &path) {
                trace!(path = %path.display(), "Excluded");
                continue;
            }

            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let metadata = if file_type.is_symlink() {
                if !self.options.follow_symlinks {
                    continue;
                }
                match fs::metadata(&path) {
                    Ok(meta) if meta.is_dir() => meta,
                    _ => continue,
                }
            } else if file_type.is_dir() {
                match entry.metadata() {
                    Ok(meta) => meta,
                    Err(_) => continue,
                }
            } else {
                continue;
            };

            if !self.visited.track(FsIdentity::from_metadata(&metadata)) {
                trace!(path = %path.display(), "Already visited");
                continue;
            }

            if visit(path).is_break() {
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }
}
