//! Materializes one template version from a repository.

use tmplsync_core::{Filesystem, MemoryFs, copy_fs};
use tracing::debug;

use super::manifest::{COMMON_DIR, MANIFEST_DIR, Manifest};
use crate::context::OpContext;
use crate::error::RepositoryError;
use crate::repository::Repository;

/// A template version copied out of a repository snapshot.
///
/// The filesystem contains the manifest directory, the version directory
/// at its repository path and the common directory when the repository
/// has one. It stays valid after the repository is pulled or freed.
#[derive(Debug)]
pub struct ResolvedTemplate {
    pub template_id: String,
    pub version: String,
    /// Version directory inside [`ResolvedTemplate::fs`].
    pub path: String,
    /// Commit the repository was at when the content was copied.
    pub commit_hash: String,
    pub fs: MemoryFs,
}

/// Resolves templates against the repository manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateFsResolver;

impl TemplateFsResolver {
    pub fn new() -> Self {
        Self
    }

    /// Copies `template_id` at `version` into memory.
    ///
    /// Without a version the highest stable one is used. Sparse repositories
    /// load the manifest, the version and the common directory first.
    pub async fn resolve(
        &self,
        ctx: &OpContext,
        repo: &dyn Repository,
        template_id: &str,
        version: Option<&str>,
    ) -> Result<ResolvedTemplate, RepositoryError> {
        if repo.is_sparse() {
            repo.load(ctx, MANIFEST_DIR).await?;
        }

        let (version, path) = {
            let fs = repo.fs()?;
            let manifest = Manifest::read(&*fs)?;
            let template = manifest
                .template(template_id)
                .filter(|t| !t.deprecated)
                .ok_or_else(|| RepositoryError::TemplateNotFound {
                    template: template_id.to_string(),
                    repository: repo.to_string(),
                })?;
            let selected = template.select_version(version)?;
            (selected.version.clone(), template.version_path(selected))
        };

        if repo.is_sparse() {
            repo.load(ctx, &path).await?;
            repo.load(ctx, COMMON_DIR).await?;
        }

        let fs = repo.fs()?;
        let commit_hash = repo.commit_hash();
        let copy_path = path.clone();
        let memory = tokio::task::spawn_blocking(move || -> Result<MemoryFs, RepositoryError> {
            let memory = MemoryFs::new();
            copy_fs(&*fs, MANIFEST_DIR, &memory, MANIFEST_DIR)?;
            copy_fs(&*fs, &copy_path, &memory, &copy_path)?;
            if fs.is_dir(COMMON_DIR) {
                copy_fs(&*fs, COMMON_DIR, &memory, COMMON_DIR)?;
            }
            Ok(memory)
        })
        .await
        .map_err(|e| RepositoryError::Task(e.to_string()))??;

        debug!(
            "Resolved template \"{}\" {} from \"{}\" at {} ({} files)",
            template_id,
            version,
            repo,
            commit_hash,
            memory.file_count()
        );

        Ok(ResolvedTemplate {
            template_id: template_id.to_string(),
            version,
            path,
            commit_hash,
            fs: memory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::LocalRepository;
    use tmplsync_core::TemplateRepositoryRef;

    const MANIFEST: &str = r#"{
        "version": 2,
        "author": {"name": "Acme", "url": "https://example.com"},
        "templates": [
            {
                "id": "template1",
                "name": "Template 1",
                "path": "template1",
                "versions": [
                    {"version": "1.0.0", "stable": true, "path": "v1"},
                    {"version": "2.0.0", "stable": true, "path": "v2"}
                ]
            },
            {"id": "gone", "name": "Gone", "deprecated": true, "versions": []}
        ]
    }"#;

    fn repository() -> (tempfile::TempDir, LocalRepository) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join(".tmplsync")).unwrap();
        std::fs::write(root.join(".tmplsync/repository.json"), MANIFEST).unwrap();
        std::fs::create_dir_all(root.join("_common")).unwrap();
        std::fs::write(root.join("_common/snippet.txt"), "common").unwrap();
        for v in ["v1", "v2"] {
            std::fs::create_dir_all(root.join("template1").join(v)).unwrap();
            std::fs::write(root.join("template1").join(v).join("README.md"), v).unwrap();
        }
        let repo = LocalRepository::open(TemplateRepositoryRef::dir("local", root.to_string_lossy())).unwrap();
        (dir, repo)
    }

    #[tokio::test]
    async fn test_resolve_default_version() {
        let (_dir, repo) = repository();
        let resolved = TemplateFsResolver::new()
            .resolve(&OpContext::background(), &repo, "template1", None)
            .await
            .unwrap();

        assert_eq!(resolved.version, "2.0.0");
        assert_eq!(resolved.path, "template1/v2");
        assert_eq!(resolved.commit_hash, "-");
        assert_eq!(resolved.fs.read_to_string("template1/v2/README.md").unwrap(), "v2");
        assert_eq!(resolved.fs.read_to_string("_common/snippet.txt").unwrap(), "common");
        assert!(resolved.fs.is_file(".tmplsync/repository.json"));
        assert!(!resolved.fs.exists("template1/v1"));
    }

    #[tokio::test]
    async fn test_resolve_requested_version() {
        let (_dir, repo) = repository();
        let resolved = TemplateFsResolver::new()
            .resolve(&OpContext::background(), &repo, "template1", Some("1.0.0"))
            .await
            .unwrap();
        assert_eq!(resolved.path, "template1/v1");
        assert!(resolved.fs.is_file("template1/v1/README.md"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_and_deprecated() {
        let (_dir, repo) = repository();
        let resolver = TemplateFsResolver::new();
        let ctx = OpContext::background();

        let err = resolver.resolve(&ctx, &repo, "missing", None).await.unwrap_err();
        assert!(matches!(err, RepositoryError::TemplateNotFound { .. }));

        let err = resolver.resolve(&ctx, &repo, "gone", None).await.unwrap_err();
        assert!(matches!(err, RepositoryError::TemplateNotFound { .. }));
    }
}
