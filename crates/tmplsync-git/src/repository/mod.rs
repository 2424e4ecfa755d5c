//! Template repository handles.
//!
//! A [`Repository`] exposes the content of one [`TemplateRepositoryRef`]:
//!
//! - [`RemoteRepository`] clones a git reference into a private working tree
//!   and serves readers from immutable snapshots of it.
//! - [`LocalRepository`] serves an already-local directory as-is.
//!
//! Readers obtain a [`RepositoryFs`] guard from [`Repository::fs`]. While any
//! guard of a snapshot is alive the snapshot directory is not deleted, even
//! if a newer snapshot has replaced it.

mod config;
mod local;
mod remote;
mod snapshot;

pub use config::{RepositoryConfig, RepositoryConfigBuilder};
pub use local::LocalRepository;
pub use remote::RemoteRepository;

use std::fmt;
use std::future::{Future, IntoFuture};
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tmplsync_core::{Filesystem, TemplateRepositoryRef};
use tokio::sync::{OwnedRwLockReadGuard, watch};

use crate::context::OpContext;
use crate::error::RepositoryError;

/// Commit hash reported by repositories that are not versioned.
pub const COMMIT_HASH_NOT_SET: &str = "-";

/// Result of [`Repository::pull`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResult {
    pub old_hash: String,
    pub new_hash: String,
    pub changed: bool,
}

impl PullResult {
    pub fn new(old_hash: impl Into<String>, new_hash: impl Into<String>) -> Self {
        let old_hash = old_hash.into();
        let new_hash = new_hash.into();
        Self {
            changed: old_hash != new_hash,
            old_hash,
            new_hash,
        }
    }

    pub fn unchanged(hash: impl Into<String>) -> Self {
        let hash = hash.into();
        Self::new(hash.clone(), hash)
    }
}

/// Contract shared by git-backed and local template repositories.
#[async_trait]
pub trait Repository: Send + Sync + fmt::Display + fmt::Debug {
    /// Where the content comes from.
    fn definition(&self) -> &TemplateRepositoryRef;

    /// Commit of the current snapshot, [`COMMIT_HASH_NOT_SET`] if unversioned.
    fn commit_hash(&self) -> String;

    /// Returns the current content, locked against deletion until released.
    fn fs(&self) -> Result<RepositoryFs, RepositoryError>;

    /// Releases all disk resources. The returned signal completes when done.
    fn free(&self) -> FreeSignal;

    /// True if only explicitly loaded paths are present.
    fn is_sparse(&self) -> bool {
        false
    }

    /// Makes `path` available in sparse mode.
    async fn load(&self, _ctx: &OpContext, _path: &str) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Fetches upstream changes.
    async fn pull(&self, _ctx: &OpContext) -> Result<PullResult, RepositoryError> {
        Ok(PullResult::unchanged(self.commit_hash()))
    }
}

/// Read access to repository content.
///
/// Holds the shared mode of the snapshot's free-lock. Drop it, or call
/// [`RepositoryFs::release`], as soon as reading is finished: a pending
/// deletion of an outdated snapshot waits for every guard.
pub struct RepositoryFs {
    fs: Arc<dyn Filesystem>,
    _lock: Option<OwnedRwLockReadGuard<()>>,
}

impl RepositoryFs {
    pub(crate) fn locked(fs: Arc<dyn Filesystem>, lock: OwnedRwLockReadGuard<()>) -> Self {
        Self {
            fs,
            _lock: Some(lock),
        }
    }

    pub(crate) fn unlocked(fs: Arc<dyn Filesystem>) -> Self {
        Self { fs, _lock: None }
    }

    /// Releases the lock, same as dropping the guard.
    pub fn release(self) {}
}

impl Deref for RepositoryFs {
    type Target = dyn Filesystem;

    fn deref(&self) -> &Self::Target {
        self.fs.as_ref()
    }
}

impl fmt::Debug for RepositoryFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryFs")
            .field("base_path", &self.fs.base_path())
            .field("locked", &self._lock.is_some())
            .finish()
    }
}

/// Completion signal of a free operation.
///
/// Await it (or call [`FreeSignal::wait`]) to block until the disk
/// resources are gone. Clones complete together.
#[derive(Debug, Clone)]
pub struct FreeSignal {
    rx: watch::Receiver<bool>,
}

/// Completes the paired [`FreeSignal`].
#[derive(Debug)]
pub(crate) struct FreeNotifier {
    tx: watch::Sender<bool>,
}

impl FreeNotifier {
    pub(crate) fn done(self) {
        let _ = self.tx.send(true);
    }
}

impl FreeSignal {
    pub(crate) fn channel() -> (FreeNotifier, FreeSignal) {
        let (tx, rx) = watch::channel(false);
        (FreeNotifier { tx }, FreeSignal { rx })
    }

    /// An already completed signal.
    pub fn ready() -> Self {
        let (tx, rx) = watch::channel(true);
        drop(tx);
        Self { rx }
    }

    pub fn is_done(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for completion. Also returns if the freeing task died.
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|done| *done).await;
    }
}

impl IntoFuture for FreeSignal {
    type Output = ();
    type IntoFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
