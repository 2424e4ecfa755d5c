//! # tmplsync Git Repositories
//!
//! Local caching of template repositories hosted in git.
//!
//! A [`RemoteRepository`] clones one branch or tag into a private temporary
//! directory, optionally as a sparse checkout, and serves readers from
//! immutable snapshots while pulls and sparse loads run in the background.
//!
//! ## Features
//!
//! - Git operations via the system `git` CLI, with retries and timeouts
//! - Snapshot per commit, deleted only after its last reader is done
//! - Sparse checkout with on-demand loading of paths
//! - Shared handle cache and periodic updates
//! - Template version resolution from the repository manifest
//!
//! ## Example
//!
//! ```ignore
//! use tmplsync_git::{OpContext, RemoteRepository, TemplateRepositoryRef};
//!
//! let ctx = OpContext::background();
//! let definition = TemplateRepositoryRef::git("main", "https://github.com/org/templates.git", "main");
//! let repo = RemoteRepository::checkout(&ctx, definition, false).await?;
//!
//! let fs = repo.fs()?;
//! let manifest = fs.read_to_string(".tmplsync/repository.json")?;
//! fs.release();
//!
//! repo.pull(&ctx).await?;
//! repo.free().await;
//! ```

pub mod command;
pub mod context;
pub mod error;
pub mod manager;
pub mod repository;
pub mod retry;
pub mod sync;
pub mod template;

// Re-exports
pub use command::available;
pub use context::{CancelHandle, OpContext};
pub use error::{ManagerError, RepositoryError};
pub use manager::{ManagerConfig, RepositoryManager, UpdateOutcome};
pub use repository::{
    COMMIT_HASH_NOT_SET, FreeSignal, LocalRepository, PullResult, RemoteRepository, Repository, RepositoryConfig,
    RepositoryConfigBuilder, RepositoryFs,
};
pub use retry::{ExponentialBackoff, RetryConfig};
pub use sync::{RefreshConfig, RefreshHandle, RefreshScheduler, SyncState};
pub use template::{Manifest, ResolvedTemplate, TemplateFsResolver};

// Re-export tmplsync_core for consumers
pub use tmplsync_core;
pub use tmplsync_core::{RepositoryType, TemplateRepositoryRef};
