//! Refresh state tracking.

use std::time::Instant;

use parking_lot::RwLock;

/// Outcome history of scheduled repository updates.
#[derive(Debug, Default)]
pub struct SyncState {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    last_success: Option<Instant>,
    last_error: Option<String>,
    failure_count: u32,
    changes: u64,
    updates: u64,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful update that found `changes` changed repositories.
    pub fn record_success(&self, changes: usize) {
        let mut inner = self.inner.write();
        inner.last_success = Some(Instant::now());
        inner.last_error = None;
        inner.failure_count = 0;
        inner.changes += changes as u64;
        inner.updates += 1;
    }

    /// Records a failed update.
    pub fn record_failure(&self, error: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.last_error = Some(error.into());
        inner.failure_count += 1;
        inner.updates += 1;
    }

    /// Time of the last successful update.
    pub fn last_success(&self) -> Option<Instant> {
        self.inner.read().last_success
    }

    /// Returns the duration since the last successful update.
    pub fn time_since_success(&self) -> Option<std::time::Duration> {
        self.inner.read().last_success.map(|t| t.elapsed())
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// Returns the number of consecutive failures.
    pub fn failure_count(&self) -> u32 {
        self.inner.read().failure_count
    }

    /// Total number of repository changes observed.
    pub fn changes(&self) -> u64 {
        self.inner.read().changes
    }

    /// Total number of finished updates, successful or not.
    pub fn updates(&self) -> u64 {
        self.inner.read().updates
    }

    /// True once an update succeeded and no failure followed.
    pub fn is_healthy(&self) -> bool {
        let inner = self.inner.read();
        inner.last_success.is_some() && inner.last_error.is_none()
    }
}
