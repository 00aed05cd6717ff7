//! Registry of in-flight scans.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// Maps a monitored path key to the cancellation token of its running scan.
///
/// The only record of what is running right now. Cheap to clone; clones
/// share the same table.
#[derive(Debug, Clone, Default)]
pub struct ActiveScans {
    scans: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl ActiveScans {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.scans.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entry that is removed when the returned guard drops.
    pub fn register(&self, key: impl Into<String>, token: CancellationToken) -> ActiveScanGuard {
        let key = key.into();
        self.table().insert(key.clone(), token);
        ActiveScanGuard {
            scans: self.clone(),
            key,
        }
    }

    pub fn remove(&self, key: &str) -> Option<CancellationToken> {
        self.table().remove(key)
    }

    /// Keys of the scans running now, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.table().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Cancel every registered scan. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let table = self.table();
        for token in table.values() {
            token.cancel();
        }
        table.len()
    }
}

/// Removes its registry entry on drop, however the scan ended.
#[derive(Debug)]
pub struct ActiveScanGuard {
    scans: ActiveScans,
    key: String,
}

impl Drop for ActiveScanGuard {
    fn drop(&mut self) {
        self.scans.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_removes_entry() {
        let scans = ActiveScans::new();
        {
            let _guard = scans.register("/a", CancellationToken::new());
            let _other = scans.register("/b", CancellationToken::new());
            assert_eq!(scans.snapshot(), vec!["/a".to_string(), "/b".to_string()]);
        }
        assert!(scans.is_empty());
    }

    #[test]
    fn test_cancel_all() {
        let scans = ActiveScans::new();
        let first = CancellationToken::new();
        let second = CancellationToken::new();
        let _a = scans.register("/a", first.clone());
        let _b = scans.register("/b", second.clone());

        assert_eq!(scans.cancel_all(), 2);
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());
        // Cancelling does not unregister; the scans do that as they unwind.
        assert_eq!(scans.len(), 2);
    }
}
