//! Status monitor: one polling loop per service, deduplicated fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::{RemoteChannel, StatusBus};
use crate::config::MonitorConfig;
use crate::error::{SentinelError, SentinelResult};
use crate::health::{HealthProbe, ServiceStatus};
use crate::monitor::session::MonitoringSession;
use crate::observability::metrics;

/// Status map and session table, only ever touched under the monitor's gate.
#[derive(Default)]
struct MonitorTables {
    statuses: HashMap<String, ServiceStatus>,
    sessions: HashMap<String, MonitoringSession>,
}

struct MonitorInner {
    probe: Arc<HealthProbe>,
    bus: StatusBus,
    remote: Option<Arc<dyn RemoteChannel>>,
    interval: Duration,
    gate: Mutex<MonitorTables>,
}

/// Polls registered services and publishes status changes.
///
/// Cloning is cheap and every clone drives the same tables.
#[derive(Clone)]
pub struct StatusMonitor {
    inner: Arc<MonitorInner>,
}

impl StatusMonitor {
    pub fn new(
        probe: Arc<HealthProbe>,
        config: &MonitorConfig,
        remote: Option<Arc<dyn RemoteChannel>>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                probe,
                bus: StatusBus::new(config.channel_capacity),
                remote,
                interval: config.interval(),
                gate: Mutex::new(MonitorTables::default()),
            }),
        }
    }

    pub fn probe(&self) -> &Arc<HealthProbe> {
        &self.inner.probe
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceStatus> {
        self.inner.bus.subscribe()
    }

    /// Start polling `name`: one immediate probe, then one per interval.
    ///
    /// Starting an already monitored service is a no-op.
    pub async fn start_monitoring(&self, name: &str) -> SentinelResult<()> {
        if !self.inner.probe.is_registered(name) {
            tracing::warn!(service = %name, "Cannot monitor unregistered service");
            return Err(SentinelError::NotRegistered(name.to_string()));
        }

        let cancel = CancellationToken::new();
        let session_id = {
            let mut tables = self.inner.gate.lock().await;
            if tables.sessions.contains_key(name) {
                tracing::warn!(service = %name, "Service is already being monitored");
                return Ok(());
            }
            let session = MonitoringSession::new(cancel.clone());
            let id = session.id;
            // A status relayed while unmonitored must not swallow the first local result
            tables.statuses.remove(name);
            tables.sessions.insert(name.to_string(), session);
            id
        };

        tracing::info!(
            service = %name,
            session = %session_id,
            interval_ms = self.inner.interval.as_millis() as u64,
            "Monitoring started"
        );

        let status = self.inner.probe.check_health_with(name, &cancel).await;
        self.inner.apply_local(name, session_id, status).await;

        let inner = self.inner.clone();
        let task_name = name.to_string();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            inner.poll_loop(task_name, session_id, task_cancel).await;
        });

        let mut tables = self.inner.gate.lock().await;
        match tables.sessions.get_mut(name) {
            Some(session) if session.id == session_id => session.handle = Some(handle),
            // Stopped while the first probe was in flight
            _ => handle.abort(),
        }
        Ok(())
    }

    /// Stop polling `name` and forget its last status.
    ///
    /// Returns false if the service was not being monitored. No removal
    /// notification is published.
    pub async fn stop_monitoring(&self, name: &str) -> bool {
        let session = {
            let mut tables = self.inner.gate.lock().await;
            let session = tables.sessions.remove(name);
            if session.is_some() {
                tables.statuses.remove(name);
            }
            session
        };

        match session {
            Some(session) => {
                let id = session.id;
                session.shutdown().await;
                tracing::info!(service = %name, session = %id, "Monitoring stopped");
                true
            }
            None => {
                tracing::debug!(service = %name, "Stop requested for unmonitored service");
                false
            }
        }
    }

    /// Start monitoring every registered service concurrently.
    ///
    /// Each outcome is reported independently; one failure does not block
    /// the others.
    pub async fn start_all(&self) -> Vec<(String, SentinelResult<()>)> {
        let names = self.inner.probe.service_names();
        let results = join_all(names.iter().map(|name| self.start_monitoring(name))).await;

        names
            .into_iter()
            .zip(results)
            .inspect(|(name, result)| {
                if let Err(e) = result {
                    tracing::error!(service = %name, error = %e, "Failed to start monitoring");
                }
            })
            .collect()
    }

    /// Stop every active session concurrently.
    pub async fn stop_all(&self) -> Vec<String> {
        let names = self.monitored_services().await;
        let stopped = join_all(names.iter().map(|name| self.stop_monitoring(name))).await;

        names
            .into_iter()
            .zip(stopped)
            .filter_map(|(name, was_running)| was_running.then_some(name))
            .collect()
    }

    /// Last known status of `name`.
    pub async fn get_status(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.gate.lock().await.statuses.get(name).cloned()
    }

    /// Last known status of every service, sorted by name.
    pub async fn get_all_statuses(&self) -> Vec<ServiceStatus> {
        let tables = self.inner.gate.lock().await;
        let mut statuses: Vec<ServiceStatus> = tables.statuses.values().cloned().collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    pub async fn is_monitoring(&self, name: &str) -> bool {
        self.inner.gate.lock().await.sessions.contains_key(name)
    }

    /// Names with an active session, sorted.
    pub async fn monitored_services(&self) -> Vec<String> {
        let tables = self.inner.gate.lock().await;
        let mut names: Vec<String> = tables.sessions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Apply a status received from another instance.
    ///
    /// Updates local state and notifies local subscribers like a local
    /// change would, but is never forwarded back to the remote channel.
    pub async fn apply_remote(&self, status: ServiceStatus) -> bool {
        let mut tables = self.inner.gate.lock().await;
        if tables.statuses.get(&status.name) == Some(&status) {
            return false;
        }

        tracing::debug!(service = %status.name, state = %status.state, "Remote status applied");
        metrics::record_status_published(&status.name, "remote");
        tables.statuses.insert(status.name.clone(), status.clone());
        self.inner.bus.publish(status);
        true
    }

    /// Feed inbound remote statuses into [`apply_remote`](Self::apply_remote)
    /// until the receiver closes or `shutdown` fires.
    pub fn spawn_remote_listener(
        &self,
        mut inbound: mpsc::Receiver<ServiceStatus>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    status = inbound.recv() => match status {
                        Some(status) => {
                            monitor.apply_remote(status).await;
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!("Remote status listener stopped");
        })
    }
}

impl MonitorInner {
    async fn poll_loop(self: Arc<Self>, name: String, session_id: Uuid, cancel: CancellationToken) {
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let status = self.probe.check_health_with(&name, &cancel).await;
                    if cancel.is_cancelled() {
                        break;
                    }
                    self.apply_local(&name, session_id, status).await;
                }
            }
        }

        tracing::debug!(service = %name, session = %session_id, "Polling loop exited");
    }

    /// Store and fan out a locally probed status if it differs from the last one.
    async fn apply_local(&self, name: &str, session_id: Uuid, status: ServiceStatus) {
        {
            let mut tables = self.gate.lock().await;
            match tables.sessions.get(name) {
                Some(session) if session.id == session_id => {}
                _ => {
                    tracing::debug!(service = %name, session = %session_id, "Discarding status from stale session");
                    return;
                }
            }

            if tables.statuses.get(name) == Some(&status) {
                return;
            }

            tracing::info!(
                service = %name,
                state = %status.state,
                error = status.error.as_deref().unwrap_or(""),
                "Service status changed"
            );
            tables.statuses.insert(name.to_string(), status.clone());
            self.bus.publish(status.clone());
        }

        metrics::record_status_published(name, "local");

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.publish(&status).await {
                tracing::warn!(service = %name, error = %e, "Remote status broadcast failed");
            }
        }
    }
}
