//! Error types for tmplsync core.
//!
//! All fallible operations of the filesystem abstraction and of the
//! domain types return [`Result`], an alias over [`CoreError`].
//!
//! # Example
//!
//! ```
//! use tmplsync_core::{CoreError, Result};
//!
//! fn read_manifest(found: bool) -> Result<String> {
//!     if !found {
//!         return Err(CoreError::not_found(".tmplsync/repository.json"));
//!     }
//!     Ok("{}".into())
//! }
//!
//! let err = read_manifest(false).unwrap_err();
//! assert!(err.is_not_found());
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type of the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A path does not exist in the filesystem.
    #[error("path \"{path}\" not found")]
    NotFound {
        /// Relative path inside the filesystem
        path: String,
    },

    /// A directory was expected but a file was found, or vice versa.
    #[error("path \"{path}\" is not a {expected}")]
    UnexpectedKind {
        path: String,
        /// "file", "directory" or "symbolic link"
        expected: &'static str,
    },

    /// A path component is a symbolic link. Links are never followed.
    #[error("path \"{path}\" goes through symbolic link \"{link}\"")]
    SymlinkInPath { path: String, link: String },

    /// The relative path escapes the filesystem root.
    #[error("path \"{path}\" is outside of the filesystem root")]
    OutsideRoot { path: String },

    /// A template repository reference is not usable.
    #[error("invalid repository definition, field \"{field}\": {reason}")]
    InvalidDefinition { field: String, reason: String },

    /// I/O error on the underlying disk.
    #[error("I/O error at \"{}\": {source}", path.display())]
    Io {
        /// Absolute path the operation touched
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file could not be decoded.
    #[error("cannot decode \"{path}\": {message}")]
    Decode { path: String, message: String },
}

impl CoreError {
    /// Creates a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates an UnexpectedKind error for a path that should be a directory.
    pub fn not_a_dir(path: impl Into<String>) -> Self {
        Self::UnexpectedKind {
            path: path.into(),
            expected: "directory",
        }
    }

    /// Creates an UnexpectedKind error for a path that should be a file.
    pub fn not_a_file(path: impl Into<String>) -> Self {
        Self::UnexpectedKind {
            path: path.into(),
            expected: "file",
        }
    }

    /// Creates an UnexpectedKind error for a path that should be a symbolic link.
    pub fn not_a_symlink(path: impl Into<String>) -> Self {
        Self::UnexpectedKind {
            path: path.into(),
            expected: "symbolic link",
        }
    }

    /// Creates an InvalidDefinition error.
    pub fn invalid_definition(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a Decode error.
    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error indicates a missing path.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns true if this is an I/O error.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Type alias for Results with CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let error = CoreError::not_found("template1/v1");
        assert_eq!(error.to_string(), "path \"template1/v1\" not found");
        assert!(error.is_not_found());
    }

    #[test]
    fn test_io_not_found_is_not_found() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "missing");
        let error = CoreError::io("/tmp/x", io_error);
        assert!(error.is_not_found());
        assert!(error.is_io_error());

        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let error = CoreError::io("/tmp/x", io_error);
        assert!(!error.is_not_found());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error = CoreError::io("/tmp/x", io_error);
        assert!(error.source().is_some());
    }

    #[test]
    fn test_unexpected_kind() {
        assert_eq!(
            CoreError::not_a_dir("a.txt").to_string(),
            "path \"a.txt\" is not a directory"
        );
        assert_eq!(
            CoreError::not_a_file("dir").to_string(),
            "path \"dir\" is not a file"
        );
    }

    #[test]
    fn test_invalid_definition() {
        let error = CoreError::invalid_definition("url", "cannot be empty");
        assert!(error.to_string().contains("url"));
        assert!(error.to_string().contains("cannot be empty"));
    }
}
