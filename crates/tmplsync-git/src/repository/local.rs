//! Repository served from a local directory.

use std::fmt;
use std::sync::Arc;

use tmplsync_core::{CoreError, Filesystem, LocalFs, RepositoryType, TemplateRepositoryRef};
use tracing::debug;

use super::{COMMIT_HASH_NOT_SET, FreeSignal, Repository, RepositoryFs};
use crate::error::RepositoryError;

/// A `dir` repository: the directory is read in place, nothing is copied.
///
/// Content changes on disk are visible immediately, there is no commit
/// hash and nothing to pull or free.
#[derive(Debug)]
pub struct LocalRepository {
    definition: TemplateRepositoryRef,
    fs: Arc<LocalFs>,
}

impl LocalRepository {
    /// Opens the directory named by the definition's URL.
    pub fn open(definition: TemplateRepositoryRef) -> Result<Self, RepositoryError> {
        if definition.repo_type() != RepositoryType::Dir {
            return Err(CoreError::invalid_definition(
                "type",
                format!("expected \"dir\", found \"{}\"", definition.repo_type()),
            )
            .into());
        }
        definition.validate()?;
        let fs = LocalFs::new(definition.url())?;
        debug!("Opened local repository \"{}\"", definition.url());
        Ok(Self {
            definition,
            fs: Arc::new(fs),
        })
    }
}

impl fmt::Display for LocalRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dir:{}", self.definition.url())
    }
}

impl Repository for LocalRepository {
    fn definition(&self) -> &TemplateRepositoryRef {
        &self.definition
    }

    fn commit_hash(&self) -> String {
        COMMIT_HASH_NOT_SET.to_string()
    }

    fn fs(&self) -> Result<RepositoryFs, RepositoryError> {
        let fs: Arc<dyn Filesystem> = self.fs.clone();
        Ok(RepositoryFs::unlocked(fs))
    }

    fn free(&self) -> FreeSignal {
        FreeSignal::ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OpContext;

    #[tokio::test]
    async fn test_local_repository() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), "content").unwrap();

        let def = TemplateRepositoryRef::dir("local", dir.path().to_string_lossy());
        let repo = LocalRepository::open(def).unwrap();

        assert_eq!(repo.commit_hash(), COMMIT_HASH_NOT_SET);
        assert!(!repo.is_sparse());
        assert_eq!(repo.fs().unwrap().read_to_string("file.txt").unwrap(), "content");

        let ctx = OpContext::background();
        repo.load(&ctx, "anything").await.unwrap();
        let result = repo.pull(&ctx).await.unwrap();
        assert!(!result.changed);
        assert_eq!(result.new_hash, COMMIT_HASH_NOT_SET);

        let signal = repo.free();
        assert!(signal.is_done());
        signal.await;
        // Local content is not owned by the repository
        assert!(dir.path().join("file.txt").exists());
    }

    #[test]
    fn test_open_rejects_git_definition() {
        let def = TemplateRepositoryRef::git("r", "file:///tmp/repo", "main");
        assert!(LocalRepository::open(def).is_err());
    }

    #[test]
    fn test_open_missing_dir() {
        let def = TemplateRepositoryRef::dir("r", "/nonexistent/tmplsync/repo");
        let err = LocalRepository::open(def).unwrap_err();
        assert!(matches!(err, RepositoryError::Core(_)));
    }
}
