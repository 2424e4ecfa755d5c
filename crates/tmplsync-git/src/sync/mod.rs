//! Periodic repository updates.
//!
//! A [`RefreshScheduler`] pulls every repository of a
//! [`RepositoryManager`](crate::RepositoryManager) on a fixed interval and
//! backs off after repeated failures.

mod scheduler;
mod state;

pub use scheduler::{RefreshConfig, RefreshHandle, RefreshScheduler};
pub use state::SyncState;
