//! Background refresh scheduler.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::SyncState;
use crate::context::OpContext;
use crate::error::ManagerError;
use crate::manager::{RepositoryManager, UpdateOutcome};

/// Configuration for the refresh scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshConfig {
    /// Interval between updates.
    #[serde(with = "secs")]
    pub interval: Duration,
    /// Number of consecutive failures before backing off.
    pub max_failures: u32,
    /// Backoff multiplier for failures.
    pub backoff_multiplier: f64,
    /// Maximum backoff duration.
    #[serde(with = "secs")]
    pub max_backoff: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_failures: 3,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(300),
        }
    }
}

/// Stops the scheduler when stopped or dropped.
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl RefreshHandle {
    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Periodically pulls every repository of a [`RepositoryManager`].
pub struct RefreshScheduler {
    manager: Arc<RepositoryManager>,
    state: Arc<SyncState>,
    config: RefreshConfig,
    current_interval: Mutex<Duration>,
}

impl RefreshScheduler {
    pub fn new(manager: Arc<RepositoryManager>, state: Arc<SyncState>, config: RefreshConfig) -> Self {
        Self {
            manager,
            state,
            current_interval: Mutex::new(config.interval),
            config,
        }
    }

    /// Creates a scheduler with default configuration.
    pub fn with_defaults(manager: Arc<RepositoryManager>, state: Arc<SyncState>) -> Self {
        Self::new(manager, state, RefreshConfig::default())
    }

    /// Interval until the next update, grown by failures.
    pub fn current_interval(&self) -> Duration {
        *self.current_interval.lock()
    }

    /// Starts the background task.
    ///
    /// The first update runs one interval after the start.
    pub fn start(self) -> RefreshHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(self.run(shutdown_rx));
        RefreshHandle { shutdown_tx }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut timer = interval(self.config.interval);
        // The first tick completes immediately
        timer.tick().await;

        info!("Starting refresh scheduler with interval {:?}", self.config.interval);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    // Stops an in-flight update together with the scheduler
                    let (ctx, cancel) = OpContext::with_cancel();
                    tokio::select! {
                        _ = self.refresh(&ctx) => {},
                        _ = shutdown_rx.changed() => {
                            cancel.cancel();
                            info!("Refresh scheduler shutting down");
                            break;
                        }
                    }

                    let current = self.current_interval();
                    if current != timer.period() {
                        timer = interval(current);
                        timer.tick().await;
                    }
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Refresh scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Runs one update of all repositories and records the outcome.
    pub async fn refresh(&self, ctx: &OpContext) -> Result<Vec<UpdateOutcome>, ManagerError> {
        debug!("Starting scheduled update");

        let result = self.manager.update(ctx).await;
        match &result {
            Ok(outcomes) => {
                let changes = outcomes.iter().filter(|o| o.result.changed).count();
                self.state.record_success(changes);
                self.reset_backoff();
                debug!("Update successful, {} repositories changed", changes);
            },
            Err(e) => {
                self.state.record_failure(e.to_string());
                self.increase_backoff();
                warn!("Update failed: {}", e);
            },
        }
        result
    }

    fn reset_backoff(&self) {
        *self.current_interval.lock() = self.config.interval;
    }

    fn increase_backoff(&self) {
        let mut current = self.current_interval.lock();
        let failure_count = self.state.failure_count();

        if failure_count >= self.config.max_failures {
            let grown = Duration::from_secs_f64(current.as_secs_f64() * self.config.backoff_multiplier);
            *current = grown.min(self.config.max_backoff);

            debug!("Increased interval to {:?} after {} failures", *current, failure_count);
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
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
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerConfig;
    use tmplsync_core::TemplateRepositoryRef;

    async fn scheduler(config: RefreshConfig, defaults: Vec<TemplateRepositoryRef>) -> RefreshScheduler {
        let manager = RepositoryManager::new(&OpContext::background(), ManagerConfig::default(), defaults)
            .await
            .unwrap();
        RefreshScheduler::new(manager, Arc::new(SyncState::new()), config)
    }

    #[test]
    fn test_refresh_config_default() {
        let config = RefreshConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.max_failures, 3);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.max_backoff, Duration::from_secs(300));
    }

    #[test]
    fn test_refresh_config_serde() {
        let config: RefreshConfig = serde_json::from_str(r#"{"interval":10,"maxFailures":1}"#).unwrap();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.max_failures, 1);
        assert_eq!(config.max_backoff, Duration::from_secs(300));
    }

    #[test]
    fn test_refresh_handle_stop() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = RefreshHandle { shutdown_tx };

        assert!(!*shutdown_rx.borrow());
        handle.stop();
        assert!(*shutdown_rx.borrow());
    }

    #[tokio::test]
    async fn test_refresh_records_success() {
        let dir = tempfile::tempdir().unwrap();
        let def = TemplateRepositoryRef::dir("local", dir.path().to_string_lossy());
        let scheduler = scheduler(RefreshConfig::default(), vec![def]).await;

        let outcomes = scheduler.refresh(&OpContext::background()).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(scheduler.state.is_healthy());
        assert_eq!(scheduler.state.changes(), 0);
    }

    #[tokio::test]
    async fn test_backoff_grows_after_max_failures() {
        let config = RefreshConfig {
            interval: Duration::from_secs(10),
            max_failures: 2,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        };
        let scheduler = scheduler(config, vec![]).await;

        scheduler.state.record_failure("e1");
        scheduler.increase_backoff();
        assert_eq!(scheduler.current_interval(), Duration::from_secs(10));

        scheduler.state.record_failure("e2");
        scheduler.increase_backoff();
        assert_eq!(scheduler.current_interval(), Duration::from_secs(20));

        scheduler.state.record_failure("e3");
        scheduler.increase_backoff();
        assert_eq!(scheduler.current_interval(), Duration::from_secs(30));

        scheduler.reset_backoff();
        assert_eq!(scheduler.current_interval(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_periodically() {
        let dir = tempfile::tempdir().unwrap();
        let def = TemplateRepositoryRef::dir("local", dir.path().to_string_lossy());
        let config = RefreshConfig {
            interval: Duration::from_secs(5),
            ..RefreshConfig::default()
        };
        let scheduler = scheduler(config, vec![def]).await;
        let state = Arc::clone(&scheduler.state);

        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(12_500)).await;
        assert_eq!(state.updates(), 2);

        handle.stop();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(state.updates(), 2);
    }
}
