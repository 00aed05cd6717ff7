//! Physical-identity tracking for loop and hardlink detection.

use std::collections::HashSet;

use usgmon_core::FsIdentity;

/// Tracks seen (device, inode) pairs for the lifetime of one pass.
///
/// The enumerator uses one per scan so a directory reachable through
/// several aliases (symlinks, bind mounts) is admitted once; the walk
/// strategy uses one per measurement so hardlinked files count once.
#[derive(Debug, Default)]
pub struct InodeTracker {
    seen: HashSet<FsIdentity>,
}

impl InodeTracker {
    /// Create a new inode tracker.
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// Track an identity. Returns `true` if this is the first time seeing it.
    pub fn track(&mut self, identity: FsIdentity) -> bool {
        self.seen.insert(identity)
    }

    /// Check if an identity has been seen (without tracking).
    pub fn has_seen(&self, identity: &FsIdentity) -> bool {
        self.seen.contains(identity)
    }

    /// Get the number of unique identities tracked.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if nothing has been tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_new_identity() {
        let mut tracker = InodeTracker::new();
        let id = FsIdentity::new(1, 12345);

        assert!(tracker.track(id));
        assert!(!tracker.track(id)); // Second time returns false
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_has_seen() {
        let mut tracker = InodeTracker::new();
        let id = FsIdentity::new(1, 12345);

        assert!(!tracker.has_seen(&id));
        tracker.track(id);
        assert!(tracker.has_seen(&id));
    }

    #[test]
    fn test_different_devices() {
        let mut tracker = InodeTracker::new();

        assert!(tracker.track(FsIdentity::new(1, 12345)));
        assert!(tracker.track(FsIdentity::new(2, 12345))); // Same inode, different device
        assert!(!tracker.is_empty());
    }
}
