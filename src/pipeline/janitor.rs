//! Scoped ownership of every temp file a run creates.
//!
//! Files are registered the moment they exist on disk (before anything is
//! written into them) as [`tempfile::TempPath`] handles. [`ResourceJanitor::release_all`]
//! removes them and closes the janitor: a file offered after that is deleted
//! on the spot and refused. `Drop` releases whatever is left as a backstop.
//! Removal failures are logged, never returned.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempPath;
use tracing::{debug, warn};

/// Outcome of a [`ResourceJanitor::release_all`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub removed: usize,
    /// Already gone before release; not an error.
    pub missing: usize,
    pub failed: usize,
}

/// Tracks transient files and removes them exactly once.
#[derive(Debug, Default)]
pub struct ResourceJanitor {
    state: Mutex<Tracked>,
}

#[derive(Debug, Default)]
struct Tracked {
    files: Vec<TempPath>,
    closed: bool,
}

impl ResourceJanitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a temp file and return its path.
    ///
    /// Returns `None` once [`release_all`](Self::release_all) has run; the
    /// file is removed immediately and must not be written.
    pub fn track(&self, resource: TempPath) -> Option<PathBuf> {
        let path = resource.to_path_buf();
        let mut state = self.lock();
        if state.closed {
            drop(state);
            warn!("Temp file offered after cleanup, removing {}", path.display());
            if let Err(e) = resource.close() {
                warn!("Failed to remove temp file {}: {}", path.display(), e);
            }
            return None;
        }
        debug!("Tracking temp file {}", path.display());
        state.files.push(resource);
        Some(path)
    }

    /// Number of files still awaiting release.
    pub fn tracked_count(&self) -> usize {
        self.lock().files.len()
    }

    /// Whether [`release_all`](Self::release_all) has run.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Remove every tracked file and refuse new ones. Idempotent.
    pub fn release_all(&self) -> ReleaseSummary {
        let drained: Vec<TempPath> = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.files)
        };
        let mut summary = ReleaseSummary::default();

        for resource in drained {
            let path = resource.to_path_buf();
            match resource.close() {
                Ok(()) => summary.removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Temp file already gone: {}", path.display());
                    summary.missing += 1;
                }
                Err(e) => {
                    warn!("Failed to remove temp file {}: {}", path.display(), e);
                    summary.failed += 1;
                }
            }
        }

        if summary != ReleaseSummary::default() {
            debug!(
                "Released temp files: {} removed, {} missing, {} failed",
                summary.removed, summary.missing, summary.failed
            );
        }
        summary
    }

    // A panic while holding the lock leaves the state intact; keep using it.
    fn lock(&self) -> std::sync::MutexGuard<'_, Tracked> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ResourceJanitor {
    fn drop(&mut self) {
        if self.tracked_count() > 0 {
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    fn temp_in(dir: &TempDir) -> TempPath {
        NamedTempFile::new_in(dir.path()).unwrap().into_temp_path()
    }

    fn entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn release_all_removes_tracked_files() {
        let dir = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();
        let a = janitor.track(temp_in(&dir)).unwrap();
        janitor.track(temp_in(&dir));
        assert!(a.exists());
        assert_eq!(janitor.tracked_count(), 2);

        let summary = janitor.release_all();
        assert_eq!(summary.removed, 2);
        assert_eq!(janitor.tracked_count(), 0);
        assert_eq!(entries(&dir), 0);
    }

    #[test]
    fn release_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();
        janitor.track(temp_in(&dir));
        assert_eq!(janitor.release_all().removed, 1);
        assert_eq!(janitor.release_all(), ReleaseSummary::default());
    }

    #[test]
    fn already_removed_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();
        let path = janitor.track(temp_in(&dir)).unwrap();
        std::fs::remove_file(&path).unwrap();

        let summary = janitor.release_all();
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn drop_releases_remaining_files() {
        let dir = TempDir::new().unwrap();
        {
            let janitor = ResourceJanitor::new();
            janitor.track(temp_in(&dir));
            janitor.track(temp_in(&dir));
        }
        assert_eq!(entries(&dir), 0);
    }

    #[test]
    fn files_offered_after_release_are_removed() {
        let dir = TempDir::new().unwrap();
        let janitor = ResourceJanitor::new();
        janitor.release_all();
        assert!(janitor.is_closed());

        assert_eq!(janitor.track(temp_in(&dir)), None);
        assert_eq!(janitor.tracked_count(), 0);
        assert_eq!(entries(&dir), 0);
    }
}
