//! Cancellation and deadlines for network operations.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Carries the cancellation signal and deadline of one operation.
///
/// Every checkout, pull and load runs git over the network, so callers
/// should bound them with [`OpContext::with_timeout`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tmplsync_git::OpContext;
///
/// let (ctx, handle) = OpContext::with_cancel();
/// let ctx = ctx.with_timeout(Duration::from_secs(30));
/// assert!(!ctx.is_cancelled());
/// handle.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels every [`OpContext`] created together with it.
///
/// Dropping the handle does not cancel anything.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals cancellation.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl OpContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Creates a context together with a handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            cancel: Some(rx),
            deadline: None,
        };
        (ctx, CancelHandle { tx })
    }

    /// Returns a copy that is also cancelled after `timeout`.
    ///
    /// An earlier existing deadline is kept.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        let flag = self.cancel.as_ref().is_some_and(|rx| *rx.borrow());
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        flag || expired
    }

    /// Resolves when the context is cancelled or its deadline passes.
    ///
    /// Never resolves for a background context.
    pub async fn cancelled(&self) {
        let flag = async {
            match &self.cancel {
                Some(rx) => {
                    let mut rx = rx.clone();
                    // Sender dropped without cancelling, wait for the deadline only
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = flag => {},
                    _ = tokio::time::sleep_until(deadline) => {},
                }
            },
            None => flag.await,
        }
    }
}
