//! Per-service polling session handle.

use std::time::SystemTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle to one service's polling loop.
///
/// The id lets late results from a stopped session be recognised and
/// discarded even if a new session for the same name was started since.
#[derive(Debug)]
pub struct MonitoringSession {
    pub id: Uuid,
    pub cancel: CancellationToken,
    pub handle: Option<JoinHandle<()>>,
    pub started_at: SystemTime,
}

impl MonitoringSession {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            cancel,
            handle: None,
            started_at: SystemTime::now(),
        }
    }

    /// Cancel the loop and wait for its task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!(session = %self.id, error = %e, "Polling task ended abnormally");
                }
            }
        }
    }
}
