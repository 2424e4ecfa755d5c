//! # tmplsync CLI
//!
//! Command line front end of the tmplsync template repository cache.
//!
//! - `checkout` clones a repository (optionally sparse) and lists its files
//! - `template` resolves one template version and copies it to a directory
//! - `watch` keeps repositories up to date until interrupted

pub mod cli;
pub mod commands;

pub use cli::{Cli, Command};
pub use commands::run;
