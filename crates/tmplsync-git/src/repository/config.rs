//! Repository handle configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tmplsync_core::TemplateRepositoryRef;

use crate::retry::RetryConfig;

/// Configuration of a [`RemoteRepository`](super::RemoteRepository).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    /// Repository URL, ref and name.
    definition: TemplateRepositoryRef,

    /// Clone without content, paths are fetched on demand by `load`.
    #[serde(default)]
    sparse: bool,

    /// Directory for working trees and snapshots, the OS temp dir if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temp_dir: Option<PathBuf>,

    /// Git executable.
    #[serde(default = "default_git_binary")]
    git_binary: PathBuf,

    /// Upper bound for the clone and the initial snapshot.
    #[serde(default = "default_checkout_timeout", with = "duration_secs")]
    checkout_timeout: Duration,

    /// Upper bound for a pull or a sparse load.
    #[serde(default = "default_pull_timeout", with = "duration_secs")]
    pull_timeout: Duration,

    /// Retry policy of single git commands.
    #[serde(default)]
    retry: RetryConfig,
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}

fn default_checkout_timeout() -> Duration {
    RepositoryConfig::DEFAULT_CHECKOUT_TIMEOUT
}

fn default_pull_timeout() -> Duration {
    RepositoryConfig::DEFAULT_PULL_TIMEOUT
}

impl RepositoryConfig {
    pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(120);
    pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a new builder for RepositoryConfig.
    pub fn builder() -> RepositoryConfigBuilder {
        RepositoryConfigBuilder::default()
    }

    pub fn definition(&self) -> &TemplateRepositoryRef {
        &self.definition
    }

    pub fn sparse(&self) -> bool {
        self.sparse
    }

    pub fn temp_dir(&self) -> Option<&PathBuf> {
        self.temp_dir.as_ref()
    }

    pub fn git_binary(&self) -> &PathBuf {
        &self.git_binary
    }

    pub fn checkout_timeout(&self) -> Duration {
        self.checkout_timeout
    }

    pub fn pull_timeout(&self) -> Duration {
        self.pull_timeout
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

/// Builder for RepositoryConfig.
#[derive(Debug, Default)]
pub struct RepositoryConfigBuilder {
    definition: Option<TemplateRepositoryRef>,
    sparse: bool,
    temp_dir: Option<PathBuf>,
    git_binary: Option<PathBuf>,
    checkout_timeout: Option<Duration>,
    pull_timeout: Option<Duration>,
    retry: Option<RetryConfig>,
}

impl RepositoryConfigBuilder {
    /// Sets the repository definition.
    pub fn definition(mut self, definition: TemplateRepositoryRef) -> Self {
        self.definition = Some(definition);
        self
    }

    /// Enables sparse checkout.
    pub fn sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Sets the parent directory of temporary repository directories.
    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    /// Sets the git executable.
    pub fn git_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.git_binary = Some(path.into());
        self
    }

    /// Sets the checkout timeout.
    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = Some(timeout);
        self
    }

    /// Sets the pull/load timeout.
    pub fn pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = Some(timeout);
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is missing.
    pub fn build(self) -> Result<RepositoryConfig, &'static str> {
        let definition = self.definition.ok_or("definition is required")?;

        Ok(RepositoryConfig {
            definition,
            sparse: self.sparse,
            temp_dir: self.temp_dir,
            git_binary: self.git_binary.unwrap_or_else(default_git_binary),
            checkout_timeout: self.checkout_timeout.unwrap_or_else(default_checkout_timeout),
            pull_timeout: self.pull_timeout.unwrap_or_else(default_pull_timeout),
            retry: self.retry.unwrap_or_default(),
        })
    }
}


mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
