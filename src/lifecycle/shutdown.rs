//! Shutdown coordination for the daemon.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks hold a child token; triggering cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for one task; cancelled when shutdown triggers.
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown triggered");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let token = self.token.clone();
        async move { token.cancelled().await }
    }
}

/// Await background tasks, aborting whatever is still running after `deadline`.
pub async fn drain(tasks: Vec<JoinHandle<()>>, deadline: Duration) {
    let count = tasks.len();
    let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();

    let joined = tokio::time::timeout(deadline, futures_util::future::join_all(tasks)).await;
    match joined {
        Ok(results) => {
            for err in results.into_iter().filter_map(Result::err) {
                if !err.is_cancelled() {
                    tracing::warn!(error = %err, "Background task ended abnormally");
                }
            }
            tracing::debug!(tasks = count, "Background tasks drained");
        }
        Err(_) => {
            tracing::warn!(
                tasks = count,
                deadline_ms = deadline.as_millis() as u64,
                "Shutdown deadline exceeded, aborting remaining tasks"
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_children() {
        let shutdown = Shutdown::new();
        let a = shutdown.token();
        let b = shutdown.token();
        assert!(!a.is_cancelled());

        shutdown.trigger();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(shutdown.is_triggered());
        shutdown.wait().await;
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_propagate_up() {
        let shutdown = Shutdown::new();
        let child = shutdown.token();
        child.cancel();
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_drain_aborts_stuck_tasks() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let stuck = tokio::spawn(async move {
            let _held = tx;
            std::future::pending::<()>().await;
        });
        drain(vec![stuck], Duration::from_millis(20)).await;
        // Sender dropped only once the task is torn down
        assert!(rx.await.is_err());
    }
}
