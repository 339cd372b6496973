//! Per-resource-directory locks.
//!
//! Extraction and manifest writes for one package are serialized; requests
//! for different packages never wait on each other. Entries are held weakly
//! so the registry only tracks directories with a request in flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[derive(Debug, Default)]
pub struct DirLocks {
    locks: Mutex<HashMap<PathBuf, Weak<Mutex<()>>>>,
}

impl DirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `dir`, creating it if no request currently holds one.
    pub fn handle(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lock) = locks.get(dir).and_then(Weak::upgrade) {
            return lock;
        }

        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(Mutex::new(()));
        locks.insert(dir.to_path_buf(), Arc::downgrade(&lock));
        lock
    }

    /// Run `f` while holding the lock for `dir`.
    ///
    /// The registry itself is released before waiting, so a slow package
    /// only blocks requests for the same directory. A panic in a previous
    /// holder does not poison the directory.
    pub fn with_lock<T>(&self, dir: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self.handle(dir);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of directories with a live lock.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
