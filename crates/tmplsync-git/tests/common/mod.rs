//! Test helpers for tmplsync-git: throwaway git repositories served over `file://`.

#![allow(dead_code, unused_macros)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;
use tmplsync_git::{RepositoryConfig, RetryConfig, TemplateRepositoryRef};

pub const MANIFEST: &str = r#"{
  "version": 2,
  "author": {"name": "Test", "url": "https://example.com"},
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
    {
      "id": "template2",
      "name": "Template 2",
      "path": "template2",
      "versions": [{"version": "0.1.0", "stable": false, "path": "v1"}]
    }
  ]
}"#;

/// Returns early from a test when git is not installed.
macro_rules! require_git {
    () => {
        if !tmplsync_git::available() {
            eprintln!("git is not available, skipping");
            return;
        }
    };
}

/// A git repository in a temporary directory, used as the upstream.
pub struct Upstream {
    dir: TempDir,
}

impl Upstream {
    /// Creates a repository with branch `main` and the template layout.
    pub fn new() -> Self {
        let upstream = Self::empty();
        upstream.write(".tmplsync/repository.json", MANIFEST);
        upstream.write("_common/snippet.txt", "common");
        upstream.write("template1/v1/README.md", "template1 v1");
        upstream.write("template1/v2/README.md", "template1 v2");
        upstream.write("template2/v1/README.md", "template2 v1");
        upstream.commit("initial");
        upstream
    }

    /// Creates a repository without commits.
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().expect("create upstream dir");
        let upstream = Self { dir };
        upstream.git(&["init", "-q"]);
        upstream.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        upstream.git(&["config", "user.name", "tmplsync"]);
        upstream.git(&["config", "user.email", "tmplsync@example.com"]);
        upstream.git(&["config", "commit.gpgsign", "false"]);
        // Partial clones of the sparse checkout fetch blobs lazily
        upstream.git(&["config", "uploadpack.allowFilter", "true"]);
        upstream.git(&["config", "uploadpack.allowAnySHA1InWant", "true"]);
        upstream
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.path().display())
    }

    pub fn definition(&self, reference: &str) -> TemplateRepositoryRef {
        TemplateRepositoryRef::git("test", self.url(), reference)
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.path().join(path);
        std::fs::create_dir_all(full.parent().expect("parent")).expect("create dirs");
        std::fs::write(full, content).expect("write file");
    }

    /// Commits all changes and returns the new HEAD.
    pub fn commit(&self, message: &str) -> String {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "--allow-empty", "-m", message]);
        self.head()
    }

    pub fn tag(&self, name: &str) {
        self.git(&["tag", name]);
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"]).trim().to_string()
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}

/// Handle configuration with a private temp root and fast failures.
pub fn config(definition: TemplateRepositoryRef, sparse: bool, temp_root: &Path) -> RepositoryConfig {
    RepositoryConfig::builder()
        .definition(definition)
        .sparse(sparse)
        .temp_dir(temp_root)
        .retry(RetryConfig::no_retry())
        .build()
        .expect("valid config")
}

/// Waits until `path` disappears, deletion runs in the background.
pub async fn wait_removed(path: &Path) -> bool {
    for _ in 0..100 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    !path.exists()
}

/// Entries of a directory, sorted.
pub fn list_dir(path: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
        .expect("read dir")
        .map(|e| e.expect("dir entry").path())
        .collect();
    entries.sort();
    entries
}
