//! Common type definitions for tmplsync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Kind of a template repository source.
///
/// # Example
///
/// ```
/// use tmplsync_core::RepositoryType;
///
/// let t: RepositoryType = "git".parse().unwrap();
/// assert_eq!(t, RepositoryType::Git);
/// assert_eq!(t.to_string(), "git");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// A plain local directory, not versioned.
    Dir,
    /// A remote (or `file://`) git repository.
    Git,
}

impl RepositoryType {
    /// Returns the type name as a string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::Git => "git",
        }
    }
}

impl fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dir" => Ok(Self::Dir),
            "git" => Ok(Self::Git),
            other => Err(CoreError::invalid_definition(
                "type",
                format!("unknown repository type \"{other}\", expected \"dir\" or \"git\""),
            )),
        }
    }
}

/// Identifies where template repository content comes from.
///
/// The value is immutable once created. For [`RepositoryType::Dir`] the
/// `url` is a local path and `ref` is ignored.
///
/// # Example
///
/// ```
/// use tmplsync_core::TemplateRepositoryRef;
///
/// let r = TemplateRepositoryRef::git("common", "https://github.com/org/templates.git", "main");
/// assert_eq!(r.to_string(), "https://github.com/org/templates.git:main");
/// assert_eq!(r.hash(), "git:https://github.com/org/templates.git:main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateRepositoryRef {
    #[serde(rename = "type")]
    repo_type: RepositoryType,
    name: String,
    url: String,
    #[serde(default, rename = "ref")]
    reference: String,
}

impl TemplateRepositoryRef {
    /// Creates a new reference.
    pub fn new(
        repo_type: RepositoryType,
        name: impl Into<String>,
        url: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            repo_type,
            name: name.into(),
            url: url.into(),
            reference: reference.into(),
        }
    }

    /// Creates a reference to a git repository at the given branch or tag.
    pub fn git(name: impl Into<String>, url: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::new(RepositoryType::Git, name, url, reference)
    }

    /// Creates a reference to a local directory.
    pub fn dir(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(RepositoryType::Dir, name, path, "")
    }

    pub fn repo_type(&self) -> RepositoryType {
        self.repo_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Repository URL, or a local path for the `dir` type.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Git branch or tag.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Returns a stable identity of the source, used as a cache key.
    pub fn hash(&self) -> String {
        match self.repo_type {
            RepositoryType::Dir => format!("{}:{}", self.repo_type, self.url),
            RepositoryType::Git => format!("{}:{}:{}", self.repo_type, self.url, self.reference),
        }
    }

    /// Checks that the reference can be used to open a repository.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(CoreError::invalid_definition("url", "cannot be empty"));
        }
        if self.repo_type == RepositoryType::Git {
            if self.reference.trim().is_empty() {
                return Err(CoreError::invalid_definition("ref", "cannot be empty"));
            }
            if self.reference.starts_with('-') {
                return Err(CoreError::invalid_definition("ref", "cannot start with '-'"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for TemplateRepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repo_type {
            RepositoryType::Dir => write!(f, "dir:{}", self.url),
            RepositoryType::Git => write!(f, "{}:{}", self.url, self.reference),
        }
    }
}
