//! Status monitor sessions, deduplication and remote fan-out.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use service_sentinel::bus::{BroadcastError, RemoteChannel};
use service_sentinel::config::{MonitorConfig, ProbeConfig};
use service_sentinel::health::{HealthProbe, ServiceState, ServiceStatus};
use service_sentinel::monitor::StatusMonitor;
use service_sentinel::SentinelError;

use common::{refused_url, start_mock_backend};

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<ServiceStatus>>,
}

impl RecordingChannel {
    fn sent(&self) -> Vec<ServiceStatus> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteChannel for RecordingChannel {
    async fn publish(&self, status: &ServiceStatus) -> Result<(), BroadcastError> {
        self.sent.lock().unwrap().push(status.clone());
        Ok(())
    }
}

struct DisconnectedChannel;

#[async_trait]
impl RemoteChannel for DisconnectedChannel {
    async fn publish(&self, _status: &ServiceStatus) -> Result<(), BroadcastError> {
        Err(BroadcastError::Disconnected)
    }
}

fn monitor_with(
    interval_ms: u64,
    probe_config: ProbeConfig,
    remote: Option<Arc<dyn RemoteChannel>>,
) -> StatusMonitor {
    let probe = Arc::new(HealthProbe::new(probe_config));
    StatusMonitor::new(
        probe,
        &MonitorConfig {
            interval_ms,
            channel_capacity: 64,
        },
        remote,
    )
}

fn monitor(interval_ms: u64) -> StatusMonitor {
    monitor_with(interval_ms, ProbeConfig::default(), None)
}

fn drain(rx: &mut broadcast::Receiver<ServiceStatus>) -> Vec<ServiceStatus> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(status) => out.push(status),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

#[tokio::test]
async fn test_start_probes_immediately() {
    let backend = start_mock_backend(200, "ok").await;
    let monitor = monitor(60_000);
    monitor.probe().register_service("llm-engine", backend.url("/health"), None);
    let mut rx = monitor.subscribe();

    monitor.start_monitoring("llm-engine").await.unwrap();

    let status = monitor.get_status("llm-engine").await.unwrap();
    assert!(status.state.is_up());
    assert!(monitor.is_monitoring("llm-engine").await);

    let published = rx.try_recv().unwrap();
    assert_eq!(published.name, "llm-engine");
    assert_eq!(backend.hits(), 1);

    monitor.stop_all().await;
}

#[tokio::test]
async fn test_start_unregistered_service_fails() {
    let monitor = monitor(60_000);
    let err = monitor.start_monitoring("ghost").await.unwrap_err();
    assert_eq!(err, SentinelError::NotRegistered("ghost".into()));
    assert!(!monitor.is_monitoring("ghost").await);
}

#[tokio::test]
async fn test_duplicate_start_is_noop() {
    let backend = start_mock_backend(200, "ok").await;
    let monitor = monitor(60_000);
    monitor.probe().register_service("llm-engine", backend.url("/health"), None);

    monitor.start_monitoring("llm-engine").await.unwrap();
    monitor.start_monitoring("llm-engine").await.unwrap();

    assert_eq!(backend.hits(), 1);
    assert_eq!(monitor.monitored_services().await, vec!["llm-engine".to_string()]);

    monitor.stop_all().await;
}

#[tokio::test]
async fn test_stop_removes_status_and_silences_service() {
    let backend = start_mock_backend(200, "ok").await;
    let monitor = monitor(50);
    monitor.probe().register_service("llm-engine", backend.url("/health"), None);
    let mut rx = monitor.subscribe();

    monitor.start_monitoring("llm-engine").await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(monitor.stop_monitoring("llm-engine").await);
    assert!(monitor.get_status("llm-engine").await.is_none());
    assert!(!monitor.is_monitoring("llm-engine").await);
    assert!(!drain(&mut rx).is_empty());

    let hits = backend.hits();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(backend.hits(), hits);
}

#[tokio::test]
async fn test_stop_unmonitored_returns_false() {
    let monitor = monitor(60_000);
    assert!(!monitor.stop_monitoring("ghost").await);
}

#[tokio::test]
async fn test_restart_runs_one_fresh_probe() {
    let backend = start_mock_backend(200, "ok").await;
    let monitor = monitor(60_000);
    monitor.probe().register_service("llm-engine", backend.url("/health"), None);

    monitor.start_monitoring("llm-engine").await.unwrap();
    monitor.stop_monitoring("llm-engine").await;
    monitor.start_monitoring("llm-engine").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(backend.hits(), 2);
    assert!(monitor.get_status("llm-engine").await.is_some());

    monitor.stop_all().await;
}

#[tokio::test]
async fn test_identical_statuses_are_published_once() {
    let backend = start_mock_backend(503, "unavailable").await;
    // High threshold keeps every probe going out
    let monitor = monitor_with(
        50,
        ProbeConfig {
            max_failures: 1_000,
            ..ProbeConfig::default()
        },
        None,
    );
    monitor.probe().register_service("llm-engine", backend.url("/health"), None);
    let mut rx = monitor.subscribe();

    monitor.start_monitoring("llm-engine").await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    monitor.stop_all().await;

    assert!(backend.hits() >= 3, "hits = {}", backend.hits());
    let published = drain(&mut rx);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].state, ServiceState::Error);
    assert_eq!(published[0].error_code(), Some("HTTP_503"));
}

#[tokio::test]
async fn test_local_changes_reach_remote_channel() {
    let backend = start_mock_backend(200, "ok").await;
    let remote = Arc::new(RecordingChannel::default());
    let monitor = monitor_with(60_000, ProbeConfig::default(), Some(remote.clone()));
    monitor.probe().register_service("llm-engine", backend.url("/health"), None);

    monitor.start_monitoring("llm-engine").await.unwrap();

    let sent = remote.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].name, "llm-engine");

    monitor.stop_all().await;
}

#[tokio::test]
async fn test_remote_failure_does_not_block_local_delivery() {
    let backend = start_mock_backend(200, "ok").await;
    let monitor = monitor_with(60_000, ProbeConfig::default(), Some(Arc::new(DisconnectedChannel)));
    monitor.probe().register_service("llm-engine", backend.url("/health"), None);
    let mut rx = monitor.subscribe();

    monitor.start_monitoring("llm-engine").await.unwrap();

    assert!(monitor.get_status("llm-engine").await.is_some());
    assert_eq!(drain(&mut rx).len(), 1);

    monitor.stop_all().await;
}

#[tokio::test]
async fn test_remote_status_is_applied_but_not_rebroadcast() {
    let remote = Arc::new(RecordingChannel::default());
    let monitor = monitor_with(60_000, ProbeConfig::default(), Some(remote.clone()));
    let mut rx = monitor.subscribe();

    let status = ServiceStatus::new("vision", ServiceState::Online).with_metric("latency_ms", 12u64);
    assert!(monitor.apply_remote(status.clone()).await);
    assert!(!monitor.apply_remote(status.clone()).await);

    assert_eq!(monitor.get_status("vision").await, Some(status.clone()));
    let published = drain(&mut rx);
    assert_eq!(published, vec![status]);
    assert!(remote.sent().is_empty());
}

#[tokio::test]
async fn test_start_publishes_first_result_over_relayed_status() {
    let backend = start_mock_backend(503, "unavailable").await;
    let remote = Arc::new(RecordingChannel::default());
    let monitor = monitor_with(60_000, ProbeConfig::default(), Some(remote.clone()));
    monitor.probe().register_service("llm-engine", backend.url("/health"), None);

    // Another instance already reported exactly what our first probe will see
    let relayed = monitor.probe().check_health("llm-engine").await;
    assert!(monitor.apply_remote(relayed.clone()).await);
    let mut rx = monitor.subscribe();

    monitor.start_monitoring("llm-engine").await.unwrap();

    let published = drain(&mut rx);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0], relayed);
    assert_eq!(remote.sent().len(), 1);
    assert_eq!(backend.hits(), 2);

    monitor.stop_all().await;
}

#[tokio::test]
async fn test_remote_listener_feeds_monitor() {
    let monitor = monitor(60_000);
    let (tx, rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();
    let listener = monitor.spawn_remote_listener(rx, shutdown.clone());

    tx.send(ServiceStatus::new("speech", ServiceState::Degraded)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = monitor.get_status("speech").await.unwrap();
    assert_eq!(status.state, ServiceState::Degraded);

    shutdown.cancel();
    listener.await.unwrap();
}

#[tokio::test]
async fn test_start_all_reports_each_service() {
    let backend = start_mock_backend(200, "ok").await;
    let monitor = monitor(60_000);
    monitor.probe().register_service("llm-engine", backend.url("/health"), None);
    monitor.probe().register_service("vision", refused_url().await, None);

    let results = monitor.start_all().await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_ok()));

    let statuses = monitor.get_all_statuses().await;
    let names: Vec<_> = statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["llm-engine", "vision"]);
    assert!(statuses[0].state.is_up());
    assert_eq!(statuses[1].state, ServiceState::Offline);

    let stopped = monitor.stop_all().await;
    assert_eq!(stopped.len(), 2);
    assert!(monitor.get_all_statuses().await.is_empty());
}
