//! Git-backed repository handle.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tmplsync_core::TemplateRepositoryRef;
use tracing::{debug, info, warn};

use super::snapshot::{StableSnapshot, remove_dir};
use super::{FreeSignal, PullResult, Repository, RepositoryConfig, RepositoryFs};
use crate::command::{CommandFailure, GitRunner};
use crate::context::OpContext;
use crate::error::RepositoryError;

const TEMP_DIR_PREFIX: &str = "tmplsync-git-repository-";
const WORKING_DIR: &str = "working";

/// Values swapped together under the values lock.
#[derive(Debug, Default)]
struct Values {
    stable: Option<Arc<StableSnapshot>>,
    commit_hash: String,
    freed: bool,
}

/// A git reference checked out into a private temporary directory.
///
/// The directory layout is:
///
/// ```text
/// <base dir>/working          git working tree, mutated by pull and load
/// <base dir>/<hash>-<random>  stable snapshots, handed out by fs()
/// ```
///
/// Pull and load never touch a snapshot in place. They copy the working
/// tree into a new snapshot, swap it in, and free the previous one once its
/// last reader has released it.
pub struct RemoteRepository {
    config: RepositoryConfig,
    base_dir: PathBuf,
    working_dir: PathBuf,
    runner: GitRunner,
    /// Serializes pull and load. Shared with the free task.
    update_lock: Arc<tokio::sync::Mutex<()>>,
    values: RwLock<Values>,
    /// Frees of replaced snapshots still waiting for their readers
    retired: Arc<Mutex<Vec<FreeSignal>>>,
    free_signal: Mutex<Option<FreeSignal>>,
}

impl RemoteRepository {
    /// Clones `definition` with default settings.
    pub async fn checkout(
        ctx: &OpContext,
        definition: TemplateRepositoryRef,
        sparse: bool,
    ) -> Result<Self, RepositoryError> {
        let config = RepositoryConfig::builder()
            .definition(definition)
            .sparse(sparse)
            .build()
            .map_err(|reason| tmplsync_core::CoreError::invalid_definition("definition", reason))?;
        Self::checkout_with_config(ctx, config).await
    }

    /// Clones the configured reference and creates the first snapshot.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::Unavailable`] if the git executable is missing
    /// - [`RepositoryError::NotFound`] if the branch or tag does not exist
    /// - [`RepositoryError::CheckoutFailed`] for any other clone failure
    ///
    /// The temporary directory is removed on every error.
    pub async fn checkout_with_config(ctx: &OpContext, config: RepositoryConfig) -> Result<Self, RepositoryError> {
        if which::which(config.git_binary()).is_err() {
            return Err(RepositoryError::Unavailable);
        }
        config.definition().validate()?;

        let ctx = ctx.clone().with_timeout(config.checkout_timeout());
        let definition = config.definition().clone();

        // Removed on drop until the checkout succeeds
        let base = create_base_dir(&config)?;
        let base_dir = base.path().to_path_buf();
        let working_dir = base_dir.join(WORKING_DIR);
        std::fs::create_dir(&working_dir)
            .map_err(|e| RepositoryError::io("cannot create working dir for git repository", &working_dir, e))?;

        let runner = GitRunner::new(config.git_binary(), &working_dir, *config.retry());

        let mut args = vec!["clone", "-q", "--depth=1", "--branch", definition.reference()];
        if config.sparse() {
            args.extend(["--no-checkout", "--sparse", "--filter=blob:none"]);
        }
        // The runner works inside the empty working dir
        args.extend(["--", definition.url(), "."]);

        info!(
            "Checking out git repository \"{}\" at \"{}\" (sparse: {})",
            definition.url(),
            definition.reference(),
            config.sparse()
        );
        if let Err(failure) = runner.run(&ctx, &args).await {
            return Err(checkout_error(&definition, failure));
        }

        let repo = Self {
            config,
            base_dir,
            working_dir,
            runner,
            update_lock: Arc::new(tokio::sync::Mutex::new(())),
            values: RwLock::new(Values::default()),
            retired: Arc::new(Mutex::new(Vec::new())),
            free_signal: Mutex::new(None),
        };
        repo.refresh_snapshot(&ctx).await?;

        let _ = base.keep();
        info!("Checked out repository \"{}\" at {}", repo, repo.commit_hash());
        Ok(repo)
    }

    pub fn definition(&self) -> &TemplateRepositoryRef {
        self.config.definition()
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn is_sparse(&self) -> bool {
        self.config.sparse()
    }

    /// Temporary directory holding the working tree and all snapshots.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Commit of the current snapshot.
    pub fn commit_hash(&self) -> String {
        self.values.read().commit_hash.clone()
    }

    pub fn is_freed(&self) -> bool {
        self.values.read().freed
    }

    /// Returns the current snapshot, locked against deletion until released.
    pub fn fs(&self) -> Result<RepositoryFs, RepositoryError> {
        let values = self.values.read();
        values
            .stable
            .as_ref()
            .and_then(|stable| stable.acquire())
            .ok_or_else(|| RepositoryError::Freed(self.to_string()))
    }

    /// Adds `path` to the sparse checkout and refreshes the snapshot.
    pub async fn load(&self, ctx: &OpContext, path: &str) -> Result<(), RepositoryError> {
        if !self.is_sparse() {
            return Err(RepositoryError::SparseNotAllowed);
        }
        let path = tmplsync_core::fs::normalize(path)?;
        if path.is_empty() || path.starts_with('-') {
            return Err(tmplsync_core::CoreError::invalid_definition("path", format!("cannot load \"{path}\"")).into());
        }

        let ctx = ctx.clone().with_timeout(self.config.pull_timeout());
        let _update = self.update_lock.lock().await;
        self.ensure_not_freed()?;

        debug!("Loading \"{}\" into repository \"{}\"", path, self);
        self.runner
            .run(&ctx, &["sparse-checkout", "add", &path])
            .await
            .map_err(|f| command_error("cannot add sparse checkout path", f))?;
        self.runner
            .run(&ctx, &["checkout"])
            .await
            .map_err(|f| command_error("cannot checkout sparse paths", f))?;

        self.refresh_snapshot(&ctx).await
    }

    /// Fetches the reference and swaps in a new snapshot if the commit changed.
    pub async fn pull(&self, ctx: &OpContext) -> Result<PullResult, RepositoryError> {
        let ctx = ctx.clone().with_timeout(self.config.pull_timeout());
        let _update = self.update_lock.lock().await;
        self.ensure_not_freed()?;

        let origin_ref = format!("origin/{}", self.definition().reference());
        self.runner
            .run(&ctx, &["fetch", "origin"])
            .await
            .map_err(|f| command_error("cannot fetch repository", f))?;
        self.runner
            .run(&ctx, &["reset", "--hard", &origin_ref])
            .await
            .map_err(|f| command_error("cannot reset repository to the origin", f))?;

        let new_hash = self.obtain_commit_hash(&ctx).await?;
        let result = PullResult::new(self.commit_hash(), new_hash);
        if result.changed {
            self.refresh_snapshot(&ctx).await?;
            info!(
                "Repository \"{}\" updated from {} to {}",
                self, result.old_hash, result.new_hash
            );
        } else {
            debug!("Repository \"{}\" has no change at {}", self, result.new_hash);
        }
        Ok(result)
    }

    /// Releases the working tree and every snapshot.
    ///
    /// Returns immediately, the signal completes once all readers have
    /// released their snapshots and the directory is gone. Calling it again
    /// returns a signal of the first call. Must be called within a tokio
    /// runtime.
    pub fn free(&self) -> FreeSignal {
        let mut slot = self.free_signal.lock();
        if let Some(signal) = slot.as_ref() {
            return signal.clone();
        }

        let (notifier, signal) = FreeSignal::channel();
        *slot = Some(signal.clone());

        let stable = {
            let mut values = self.values.write();
            values.freed = true;
            values.stable.take()
        };

        let update_lock = Arc::clone(&self.update_lock);
        let retired = Arc::clone(&self.retired);
        let base_dir = self.base_dir.clone();
        let name = self.to_string();
        tokio::spawn(async move {
            // Waits for an in-flight pull or load
            let _update = update_lock.lock_owned().await;
            if let Some(stable) = stable {
                stable.free().await;
            }
            // Replaced snapshots may still have readers
            let pending = std::mem::take(&mut *retired.lock());
            for signal in pending {
                signal.await;
            }
            let path = base_dir.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || remove_dir(&path)).await {
                warn!("Cannot remove dir of repository \"{}\": {}", name, e);
            }
            info!("Freed repository \"{}\" at {}", name, base_dir.display());
            notifier.done();
        });
        signal
    }

    fn ensure_not_freed(&self) -> Result<(), RepositoryError> {
        if self.is_freed() {
            return Err(RepositoryError::Freed(self.to_string()));
        }
        Ok(())
    }

    async fn obtain_commit_hash(&self, ctx: &OpContext) -> Result<String, RepositoryError> {
        let output = self
            .runner
            .run(ctx, &["rev-parse", "HEAD"])
            .await
            .map_err(|f| command_error("cannot get repository hash", f))?;
        Ok(output.stdout.trim().to_string())
    }

    /// Copies the working tree into a new snapshot and makes it current.
    async fn refresh_snapshot(&self, ctx: &OpContext) -> Result<(), RepositoryError> {
        let commit_hash = self.obtain_commit_hash(ctx).await?;

        let base_dir = self.base_dir.clone();
        let working_dir = self.working_dir.clone();
        let hash = commit_hash.clone();
        let snapshot = tokio::task::spawn_blocking(move || StableSnapshot::create(&base_dir, &working_dir, &hash))
            .await
            .map_err(|e| RepositoryError::Task(e.to_string()))??;

        let snapshot = Arc::new(snapshot);
        let swapped = {
            let mut values = self.values.write();
            if values.freed {
                None
            } else {
                values.commit_hash = commit_hash;
                Some(values.stable.replace(Arc::clone(&snapshot)))
            }
        };

        let Some(previous) = swapped else {
            // Freed while copying, the snapshot was never published
            snapshot.free().await;
            return Err(RepositoryError::Freed(self.to_string()));
        };
        if let Some(previous) = previous {
            debug!(
                "Replacing snapshot {} of repository \"{}\"",
                previous.commit_hash(),
                self
            );
            let signal = previous.free();
            let mut retired = self.retired.lock();
            retired.retain(|s| !s.is_done());
            retired.push(signal);
        }
        Ok(())
    }
}

fn create_base_dir(config: &RepositoryConfig) -> Result<tempfile::TempDir, RepositoryError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_DIR_PREFIX);
    match config.temp_dir() {
        Some(parent) => {
            std::fs::create_dir_all(parent)
                .map_err(|e| RepositoryError::io("cannot create temp dir for git repository", parent, e))?;
            builder.tempdir_in(parent)
        },
        None => builder.tempdir(),
    }
    .map_err(|e| RepositoryError::io("cannot create temp dir for git repository", std::env::temp_dir(), e))
}

fn checkout_error(definition: &TemplateRepositoryRef, failure: CommandFailure) -> RepositoryError {
    let not_found = format!("Remote branch {} not found", definition.reference());
    if failure.output.stderr.contains(&not_found) {
        RepositoryError::NotFound {
            reference: definition.reference().to_string(),
            url: definition.url().to_string(),
        }
    } else if failure.is_cancelled() {
        RepositoryError::Cancelled
    } else {
        RepositoryError::CheckoutFailed {
            url: definition.url().to_string(),
            reference: definition.reference().to_string(),
            output: failure.details(),
        }
    }
}

fn command_error(action: &str, failure: CommandFailure) -> RepositoryError {
    if failure.is_cancelled() {
        RepositoryError::Cancelled
    } else {
        RepositoryError::command(action, failure.details())
    }
}

impl fmt::Display for RemoteRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.definition().url(), self.definition().reference())
    }
}

impl fmt::Debug for RemoteRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.read();
        f.debug_struct("RemoteRepository")
            .field("definition", self.definition())
            .field("sparse", &self.is_sparse())
            .field("base_dir", &self.base_dir)
            .field("commit_hash", &values.commit_hash)
            .field("freed", &values.freed)
            .finish()
    }
}

impl Drop for RemoteRepository {
    fn drop(&mut self) {
        if self.free_signal.lock().is_some() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            self.free();
        } else {
            remove_dir(&self.base_dir);
        }
    }
}

#[async_trait]
impl Repository for RemoteRepository {
    fn definition(&self) -> &TemplateRepositoryRef {
        RemoteRepository::definition(self)
    }

    fn commit_hash(&self) -> String {
        RemoteRepository::commit_hash(self)
    }

    fn fs(&self) -> Result<RepositoryFs, RepositoryError> {
        RemoteRepository::fs(self)
    }

    fn free(&self) -> FreeSignal {
        RemoteRepository::free(self)
    }

    fn is_sparse(&self) -> bool {
        RemoteRepository::is_sparse(self)
    }

    async fn load(&self, ctx: &OpContext, path: &str) -> Result<(), RepositoryError> {
        RemoteRepository::load(self, ctx, path).await
    }

    async fn pull(&self, ctx: &OpContext) -> Result<PullResult, RepositoryError> {
        RemoteRepository::pull(self, ctx).await
    }
}
