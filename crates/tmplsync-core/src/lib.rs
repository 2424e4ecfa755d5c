//! tmplsync Core - Domain types and filesystem abstraction
//!
//! This crate provides the foundational types shared by the template
//! repository layer: the [`TemplateRepositoryRef`] value identifying where
//! templates come from, and the [`Filesystem`] abstraction through which
//! repository content is read and copied.

pub mod error;
pub mod fs;
pub mod types;

pub use error::{CoreError, Result};
pub use fs::{DirEntry, EntryKind, Filesystem, LocalFs, MemoryFs, copy_fs};
pub use types::{RepositoryType, TemplateRepositoryRef};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
