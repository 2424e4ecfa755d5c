//! Error types for template repositories.

use std::fmt;
use std::path::PathBuf;

use tmplsync_core::CoreError;

/// Errors that can occur when working with template repositories.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The git executable is not installed or not on the search path.
    #[error("git command is not available, you have to install it first")]
    Unavailable,

    /// The requested branch or tag does not exist in the remote repository.
    #[error("reference \"{reference}\" not found in the git repository \"{url}\"")]
    NotFound { reference: String, url: String },

    /// Clone failed for another reason, the output of git is attached.
    #[error("git repository \"{url}\" could not be checked out at \"{reference}\": {output}")]
    CheckoutFailed {
        url: String,
        reference: String,
        output: String,
    },

    /// `load` was called on a repository checked out without sparse mode.
    #[error("sparse checkout is not allowed")]
    SparseNotAllowed,

    /// A git command failed after all retries.
    #[error("{action}: {output}")]
    Command { action: String, output: String },

    /// Local filesystem error, for example while creating a snapshot.
    #[error("{context} \"{}\": {source}", path.display())]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error from the filesystem abstraction or an invalid definition.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Copying the working tree into a new snapshot failed.
    #[error("cannot copy working dir to stable dir: {0}")]
    Snapshot(#[source] CoreError),

    /// The operation was cancelled before any command failed.
    #[error("operation cancelled")]
    Cancelled,

    /// The repository handle has already been freed.
    #[error("repository \"{0}\" has been freed")]
    Freed(String),

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),

    /// The repository manifest is missing.
    #[error("manifest \"{0}\" not found")]
    ManifestNotFound(String),

    /// The repository manifest cannot be parsed.
    #[error("invalid manifest \"{path}\": {reason}")]
    InvalidManifest { path: String, reason: String },

    /// The template is not listed in the manifest.
    #[error("template \"{template}\" not found in repository \"{repository}\"")]
    TemplateNotFound {
        template: String,
        repository: String,
    },

    /// The template exists, but not in the requested version.
    #[error("template \"{template}\" has no version \"{version}\"")]
    VersionNotFound { template: String, version: String },
}

/// Failures of an operation spanning several repositories.
#[derive(Debug)]
pub struct ManagerError {
    /// Repository name and its error, sorted by name.
    pub failures: Vec<(String, RepositoryError)>,
}

impl ManagerError {
    pub(crate) fn new(mut failures: Vec<(String, RepositoryError)>) -> Self {
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        Self { failures }
    }
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} repositories failed:", self.failures.len())?;
        for (name, err) in &self.failures {
            write!(f, "\n- \"{name}\": {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ManagerError {}

impl RepositoryError {
    /// Creates a Command error.
    pub fn command(action: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Command {
            action: action.into(),
            output: output.into(),
        }
    }

    /// Creates an Io error.
    pub fn io(context: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            path: path.into(),
            source,
        }
    }

    /// Returns true if the reference or a template was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::ManifestNotFound(_)
                | Self::TemplateNotFound { .. }
                | Self::VersionNotFound { .. }
        )
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Command { .. } | Self::Cancelled)
    }
}
