//! Immutable copies of the working tree.

use std::path::Path;
use std::sync::Arc;

use tmplsync_core::{LocalFs, copy_fs};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{FreeSignal, RepositoryFs};
use crate::error::RepositoryError;

/// A directory pinned to one commit, deleted only when no reader holds it.
#[derive(Debug)]
pub(crate) struct StableSnapshot {
    fs: Arc<LocalFs>,
    commit_hash: String,
    free_lock: Arc<RwLock<()>>,
}

impl StableSnapshot {
    /// Copies `working` into a new `<hash>-<random>` directory under `base_dir`.
    ///
    /// Blocking, run it on a blocking thread. A partially copied directory
    /// is removed on failure.
    pub(crate) fn create(base_dir: &Path, working: &Path, commit_hash: &str) -> Result<Self, RepositoryError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{commit_hash}-"))
            .rand_bytes(8)
            .tempdir_in(base_dir)
            .map_err(|e| RepositoryError::io("cannot create stable dir for git repository", base_dir, e))?;

        let src = LocalFs::new(working)?;
        let dst = LocalFs::new(dir.path())?;
        copy_fs(&src, "", &dst, "").map_err(RepositoryError::Snapshot)?;

        // Copy complete, the directory outlives the guard from now on
        let _ = dir.keep();
        debug!("Created stable dir {} at {}", dst.base().display(), commit_hash);

        Ok(Self {
            fs: Arc::new(dst),
            commit_hash: commit_hash.to_string(),
            free_lock: Arc::new(RwLock::new(())),
        })
    }

    pub(crate) fn commit_hash(&self) -> &str {
        &self.commit_hash
    }

    pub(crate) fn path(&self) -> &Path {
        self.fs.base()
    }

    /// Takes the shared mode of the free-lock.
    ///
    /// Returns `None` only once a free has started.
    pub(crate) fn acquire(&self) -> Option<RepositoryFs> {
        let guard = Arc::clone(&self.free_lock).try_read_owned().ok()?;
        let fs: Arc<dyn tmplsync_core::Filesystem> = self.fs.clone();
        Some(RepositoryFs::locked(fs, guard))
    }

    /// Deletes the directory once every reader has released it.
    ///
    /// Must be called within a tokio runtime.
    pub(crate) fn free(self: Arc<Self>) -> FreeSignal {
        let (notifier, signal) = FreeSignal::channel();
        let lock = Arc::clone(&self.free_lock);
        tokio::spawn(async move {
            let _exclusive = lock.write_owned().await;
            let path = self.path().to_path_buf();
            match tokio::task::spawn_blocking(move || remove_dir(&path)).await {
                Ok(()) => debug!("Freed stable dir {} at {}", self.path().display(), self.commit_hash),
                Err(e) => warn!("Cannot free stable dir {}: {}", self.path().display(), e),
            }
            notifier.done();
        });
        signal
    }

}

/// Removes a directory tree, a missing one is not an error. Blocking.
pub(crate) fn remove_dir(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!("Cannot remove directory {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tmplsync_core::Filesystem;

    fn working_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("template1/v1")).unwrap();
        std::fs::write(dir.path().join("template1/v1/README.md"), "hello").unwrap();
        std::fs::write(dir.path().join("root.txt"), "root").unwrap();
        dir
    }

    #[test]
    fn test_create_copies_working_tree() {
        let base = tempfile::tempdir().unwrap();
        let working = working_tree();

        let snapshot = StableSnapshot::create(base.path(), working.path(), "abc123").unwrap();
        assert_eq!(snapshot.commit_hash(), "abc123");
        assert!(snapshot.path().starts_with(base.path()));

        let name = snapshot.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("abc123-"));
        assert_eq!(name.len(), "abc123-".len() + 8);

        let fs = snapshot.acquire().unwrap();
        assert_eq!(fs.read_to_string("template1/v1/README.md").unwrap(), "hello");
        assert_eq!(fs.read_to_string("root.txt").unwrap(), "root");
    }

    #[test]
    fn test_create_fails_for_missing_working_tree() {
        let base = tempfile::tempdir().unwrap();
        let err = StableSnapshot::create(base.path(), &base.path().join("missing"), "abc").unwrap_err();
        assert!(matches!(err, RepositoryError::Core(_)));

        // The partial directory is gone
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_free_waits_for_readers() {
        let base = tempfile::tempdir().unwrap();
        let working = working_tree();
        let snapshot = Arc::new(StableSnapshot::create(base.path(), working.path(), "abc").unwrap());
        let path = snapshot.path().to_path_buf();

        let reader = snapshot.acquire().unwrap();
        let signal = Arc::clone(&snapshot).free();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!signal.is_done());
        assert_eq!(reader.read_to_string("root.txt").unwrap(), "root");
        assert!(snapshot.acquire().is_none());

        reader.release();
        signal.await;
        assert!(!path.exists());
    }
}
