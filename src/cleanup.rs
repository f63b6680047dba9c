//! Scoped release of files created during an ingest.
//!
//! A [`CleanupGuard`] is opened at the start of an ingest and every file is
//! registered with it right before the step that may create it:
//!
//! - **transient** files (tag-writer sidecars) are removed on every exit path;
//! - **owned** files (original, derivatives) are removed unless the guard is
//!   [committed](CleanupGuard::commit), in reverse order of registration.
//!
//! Release runs in `Drop`, so early returns via `?` and panics both clean up.
//! A file that is already gone counts as released. Any other deletion error
//! is logged and swallowed so it never replaces the error that caused the
//! rollback.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Registered {
    transient: Vec<PathBuf>,
    owned: Vec<PathBuf>,
}

/// RAII guard over the files one ingest acquires.
///
/// Registration takes `&self` so parallel derivative workers can register
/// their outputs directly.
#[derive(Debug, Default)]
pub struct CleanupGuard {
    registered: Mutex<Registered>,
    committed: bool,
}

impl CleanupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file that must not outlive the guard.
    pub fn transient(&self, path: &Path) {
        self.lock().transient.push(path.to_path_buf());
    }

    /// Register a file that is kept on commit and removed otherwise.
    pub fn own(&self, path: &Path) {
        let mut registered = self.lock();
        if !registered.owned.iter().any(|p| p == path) {
            registered.owned.push(path.to_path_buf());
        }
    }

    /// Owned files registered so far, in acquisition order.
    #[cfg(test)]
    fn owned(&self) -> Vec<PathBuf> {
        self.lock().owned.clone()
    }

    /// Keep owned files. Transient files are still removed on drop.
    pub fn commit(mut self) {
        self.committed = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registered> {
        // A poisoned lock only means a worker panicked mid-registration; the
        // list itself is still valid and must still be released.
        self.registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let committed = self.committed;
        let registered = std::mem::take(&mut *self.lock());

        for path in registered.transient.iter().rev() {
            remove_quietly(path);
        }
        if committed {
            return;
        }
        if !registered.owned.is_empty() {
            tracing::debug!(files = registered.owned.len(), "Rolling back ingest");
        }
        for path in registered.owned.iter().rev() {
            remove_quietly(path);
        }
    }
}

/// Remove `path`, treating "not found" as success.
///
/// Returns `true` when a file was actually deleted.
pub fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::trace!(path = %path.display(), "Removed");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove file during cleanup"
            );
            false
        }
    }
}
