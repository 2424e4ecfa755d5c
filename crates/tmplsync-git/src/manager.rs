//! Shared cache of repository handles.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tmplsync_core::{CoreError, RepositoryType, TemplateRepositoryRef};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::OpContext;
use crate::error::{ManagerError, RepositoryError};
use crate::repository::{LocalRepository, PullResult, RemoteRepository, Repository, RepositoryConfig};
use crate::retry::RetryConfig;

type Slot = Arc<OnceCell<Arc<dyn Repository>>>;

/// Settings applied to every git repository the manager checks out.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Check out repositories in sparse mode.
    pub sparse: bool,
    /// Parent of the temporary repository directories.
    pub temp_dir: Option<PathBuf>,
    /// Git executable.
    pub git_binary: PathBuf,
    pub checkout_timeout: Duration,
    pub pull_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sparse: false,
            temp_dir: None,
            git_binary: PathBuf::from("git"),
            checkout_timeout: RepositoryConfig::DEFAULT_CHECKOUT_TIMEOUT,
            pull_timeout: RepositoryConfig::DEFAULT_PULL_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Handle configuration for one definition.
    pub fn repository_config(&self, definition: TemplateRepositoryRef) -> Result<RepositoryConfig, RepositoryError> {
        let mut builder = RepositoryConfig::builder()
            .definition(definition)
            .sparse(self.sparse)
            .git_binary(&self.git_binary)
            .checkout_timeout(self.checkout_timeout)
            .pull_timeout(self.pull_timeout)
            .retry(self.retry);
        if let Some(dir) = &self.temp_dir {
            builder = builder.temp_dir(dir);
        }
        builder
            .build()
            .map_err(|reason| CoreError::invalid_definition("definition", reason).into())
    }
}

/// Result of pulling one repository in [`RepositoryManager::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub repository: String,
    #[serde(flatten)]
    pub result: PullResult,
}

/// Opens each repository once and shares the handle between callers.
///
/// Handles are keyed by [`TemplateRepositoryRef::hash`], so two definitions
/// that differ only in name share one checkout. Concurrent requests for the
/// same key wait for a single checkout. A failed checkout is not cached,
/// the next request tries again.
pub struct RepositoryManager {
    config: ManagerConfig,
    repositories: RwLock<HashMap<String, Slot>>,
    freed: AtomicBool,
}

impl RepositoryManager {
    /// Creates a manager and opens `defaults` in parallel.
    ///
    /// If any default repository fails, the ones already opened are freed
    /// and all failures are returned.
    pub async fn new(
        ctx: &OpContext,
        config: ManagerConfig,
        defaults: Vec<TemplateRepositoryRef>,
    ) -> Result<Arc<Self>, ManagerError> {
        let manager = Arc::new(Self {
            config,
            repositories: RwLock::new(HashMap::new()),
            freed: AtomicBool::new(false),
        });

        let mut tasks = JoinSet::new();
        for definition in defaults {
            let manager = Arc::clone(&manager);
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let name = definition.to_string();
                (name, manager.repository(&ctx, definition).await.map(|_| ()))
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {},
                Ok((name, Err(e))) => failures.push((name, e)),
                Err(e) => failures.push(("<task>".to_string(), RepositoryError::Task(e.to_string()))),
            }
        }

        if !failures.is_empty() {
            manager.free().await;
            return Err(ManagerError::new(failures));
        }
        Ok(manager)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Returns the handle for `definition`, opening it on first use.
    pub async fn repository(
        &self,
        ctx: &OpContext,
        definition: TemplateRepositoryRef,
    ) -> Result<Arc<dyn Repository>, RepositoryError> {
        if self.is_freed() {
            return Err(RepositoryError::Freed(definition.to_string()));
        }

        let slot = self.slot(definition.hash());
        let repo = slot.get_or_try_init(|| self.open(ctx, definition)).await?;
        let repo = Arc::clone(repo);

        // The manager was freed while the checkout was running
        if self.is_freed() {
            repo.free().await;
            return Err(RepositoryError::Freed(repo.to_string()));
        }
        Ok(repo)
    }

    /// Pulls all opened repositories in parallel.
    ///
    /// Every repository is pulled even if some fail, the error lists all
    /// failures.
    pub async fn update(&self, ctx: &OpContext) -> Result<Vec<UpdateOutcome>, ManagerError> {
        let mut tasks = JoinSet::new();
        for repo in self.opened() {
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let name = repo.to_string();
                let result = repo.pull(&ctx).await;
                (name, result)
            });
        }

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(result))) => {
                    if result.changed {
                        info!(
                            "Repository \"{}\" updated from {} to {}",
                            name, result.old_hash, result.new_hash
                        );
                    } else {
                        info!("Repository \"{}\" update finished, no change found", name);
                    }
                    outcomes.push(UpdateOutcome {
                        repository: name,
                        result,
                    });
                },
                Ok((name, Err(e))) => {
                    warn!("Cannot update repository \"{}\": {}", name, e);
                    failures.push((name, e));
                },
                Err(e) => failures.push(("<task>".to_string(), RepositoryError::Task(e.to_string()))),
            }
        }

        if !failures.is_empty() {
            return Err(ManagerError::new(failures));
        }
        outcomes.sort_by(|a, b| a.repository.cmp(&b.repository));
        Ok(outcomes)
    }

    /// Display names of all opened repositories, sorted.
    pub fn managed_repositories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.opened().iter().map(|r| r.to_string()).collect();
        names.sort();
        names
    }

    /// Frees every repository and waits until their directories are gone.
    ///
    /// Later calls to [`RepositoryManager::repository`] fail.
    pub async fn free(&self) {
        self.freed.store(true, Ordering::SeqCst);
        let opened = self.opened();
        self.repositories.write().clear();

        let signals: Vec<_> = opened.iter().map(|repo| repo.free()).collect();
        for signal in signals {
            signal.await;
        }
        debug!("Freed {} repositories", opened.len());
    }

    pub fn is_freed(&self) -> bool {
        self.freed.load(Ordering::SeqCst)
    }

    fn slot(&self, key: String) -> Slot {
        if let Some(slot) = self.repositories.read().get(&key) {
            return Arc::clone(slot);
        }
        Arc::clone(self.repositories.write().entry(key).or_default())
    }

    fn opened(&self) -> Vec<Arc<dyn Repository>> {
        self.repositories
            .read()
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect()
    }

    async fn open(
        &self,
        ctx: &OpContext,
        definition: TemplateRepositoryRef,
    ) -> Result<Arc<dyn Repository>, RepositoryError> {
        match definition.repo_type() {
            RepositoryType::Git => {
                let config = self.config.repository_config(definition)?;
                let repo = RemoteRepository::checkout_with_config(ctx, config).await?;
                Ok(Arc::new(repo))
            },
            RepositoryType::Dir => Ok(Arc::new(LocalRepository::open(definition)?)),
        }
    }
}

impl std::fmt::Debug for RepositoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryManager")
            .field("config", &self.config)
            .field("repositories", &self.managed_repositories())
            .field("freed", &self.is_freed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_dir() -> (tempfile::TempDir, TemplateRepositoryRef) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();
        let def = TemplateRepositoryRef::dir("local", dir.path().to_string_lossy());
        (dir, def)
    }

    #[test]
    fn test_repository_config_from_manager_config() {
        let config = ManagerConfig {
            sparse: true,
            temp_dir: Some(PathBuf::from("/var/tmp/x")),
            ..ManagerConfig::default()
        };
        let def = TemplateRepositoryRef::git("r", "file:///tmp/r", "main");
        let repo_config = config.repository_config(def.clone()).unwrap();
        assert!(repo_config.sparse());
        assert_eq!(repo_config.definition(), &def);
        assert_eq!(repo_config.temp_dir(), Some(&PathBuf::from("/var/tmp/x")));
    }

    #[tokio::test]
    async fn test_same_hash_shares_handle() {
        let (_dir, def) = local_dir();
        let ctx = OpContext::background();
        let manager = RepositoryManager::new(&ctx, ManagerConfig::default(), vec![def.clone()])
            .await
            .unwrap();

        let renamed = TemplateRepositoryRef::dir("other-name", def.url());
        let a = manager.repository(&ctx, def).await.unwrap();
        let b = manager.repository(&ctx, renamed).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.managed_repositories().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later");
        let def = TemplateRepositoryRef::dir("later", path.to_string_lossy());
        let ctx = OpContext::background();
        let manager = RepositoryManager::new(&ctx, ManagerConfig::default(), vec![])
            .await
            .unwrap();

        assert!(manager.repository(&ctx, def.clone()).await.is_err());
        std::fs::create_dir(&path).unwrap();
        assert!(manager.repository(&ctx, def).await.is_ok());
    }

    #[tokio::test]
    async fn test_new_fails_for_bad_default() {
        let def = TemplateRepositoryRef::dir("missing", "/nonexistent/tmplsync/dir");
        let err = RepositoryManager::new(&OpContext::background(), ManagerConfig::default(), vec![def])
            .await
            .unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, "dir:/nonexistent/tmplsync/dir");
    }

    #[tokio::test]
    async fn test_update_local_reports_no_change() {
        let (_dir, def) = local_dir();
        let ctx = OpContext::background();
        let manager = RepositoryManager::new(&ctx, ManagerConfig::default(), vec![def])
            .await
            .unwrap();

        let outcomes = manager.update(&ctx).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].result.changed);
    }

    #[tokio::test]
    async fn test_free_rejects_later_requests() {
        let (_dir, def) = local_dir();
        let ctx = OpContext::background();
        let manager = RepositoryManager::new(&ctx, ManagerConfig::default(), vec![def.clone()])
            .await
            .unwrap();

        manager.free().await;
        assert!(manager.is_freed());
        assert!(manager.managed_repositories().is_empty());
        assert!(matches!(
            manager.repository(&ctx, def).await,
            Err(RepositoryError::Freed(_))
        ));
    }
}
