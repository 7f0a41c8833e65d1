//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem from a validated configuration
//! - Register services and providers in configuration order
//! - Start background tasks (remote channel, remote listener)
//! - Apply reloaded configuration to a running instance
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Monitoring starts only when [`Sentinel::start`] is called

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::bus::{RemoteChannel, WebSocketChannel};
use crate::config::validation::{parse_http_url, ValidationError};
use crate::config::SentinelConfig;
use crate::fallback::{CapabilityProvider, FallbackRouter, HttpCapabilityProvider};
use crate::health::HealthProbe;
use crate::lifecycle::shutdown::{drain, Shutdown};
use crate::monitor::StatusMonitor;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A fully wired instance: probe, monitor, router and background tasks.
pub struct Sentinel {
    pub probe: Arc<HealthProbe>,
    pub monitor: StatusMonitor,
    pub router: Arc<FallbackRouter>,
    pub config: Arc<ArcSwap<SentinelConfig>>,
    pub remote: Option<WebSocketChannel>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Sentinel {
    /// Wire every subsystem. Must be called inside a Tokio runtime when the
    /// remote channel is enabled.
    pub fn build(config: SentinelConfig, shutdown: &Shutdown) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("service-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let probe = Arc::new(HealthProbe::with_client(config.probe.clone(), client.clone()));
        register_services(&probe, &config)?;

        let mut providers: Vec<Arc<dyn CapabilityProvider>> = Vec::with_capacity(config.providers.len());
        for provider in &config.providers {
            providers.push(Arc::new(HttpCapabilityProvider::from_config(provider, client.clone())?));
        }
        let router = Arc::new(FallbackRouter::from_config(providers, &config.fallback));

        let mut tasks = Vec::new();
        let (remote, inbound) = if config.broadcast.enabled {
            let (channel, inbound, handle) = WebSocketChannel::spawn(&config.broadcast, shutdown.token());
            tasks.push(handle);
            (Some(channel), Some(inbound))
        } else {
            (None, None)
        };

        let remote_dyn = remote
            .clone()
            .map(|c| Arc::new(c) as Arc<dyn RemoteChannel>);
        let monitor = StatusMonitor::new(probe.clone(), &config.monitor, remote_dyn);

        if let Some(inbound) = inbound {
            tasks.push(monitor.spawn_remote_listener(inbound, shutdown.token()));
        }

        tracing::info!(
            services = config.services.len(),
            providers = router.registry().len(),
            remote = remote.is_some(),
            "Sentinel initialized"
        );

        Ok(Self {
            probe,
            monitor,
            router,
            config: Arc::new(ArcSwap::from_pointee(config)),
            remote,
            tasks: Mutex::new(tasks),
        })
    }

    /// Start monitoring every registered service; returns how many started.
    pub async fn start(&self) -> usize {
        let results = self.monitor.start_all().await;
        let started = results.iter().filter(|(_, r)| r.is_ok()).count();
        tracing::info!(started = started, total = results.len(), "Monitoring started");
        started
    }

    /// Apply a reloaded configuration.
    ///
    /// Services are re-registered with overwrite semantics and newly added
    /// ones start monitoring. Provider and broadcast changes need a restart.
    pub async fn apply_config(&self, config: SentinelConfig) -> Result<(), StartupError> {
        register_services(&self.probe, &config)?;

        let previous = self.config.load_full();
        for service in &config.services {
            if !self.monitor.is_monitoring(&service.name).await {
                if let Err(e) = self.monitor.start_monitoring(&service.name).await {
                    tracing::warn!(service = %service.name, error = %e, "Failed to start monitoring reloaded service");
                }
            }
        }
        if previous.providers != config.providers {
            tracing::warn!("Provider changes take effect after restart");
        }

        self.config.store(Arc::new(config));
        tracing::info!("Configuration reloaded");
        Ok(())
    }

    /// Hand a background task over so [`stop`](Self::stop) waits for it.
    pub fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Stop monitoring, release providers once and wait for background tasks.
    ///
    /// Tasks are expected to watch the same [`Shutdown`] the instance was
    /// built with; whatever is still running after `deadline` is aborted.
    pub async fn stop(&self, deadline: Duration) {
        let stopped = self.monitor.stop_all().await;
        tracing::info!(sessions = stopped.len(), "Monitoring stopped");
        self.router.shutdown().await;

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        drain(tasks, deadline).await;
    }
}

fn register_services(probe: &HealthProbe, config: &SentinelConfig) -> Result<(), ValidationError> {
    for service in &config.services {
        let target = parse_http_url("services.target", &service.target)?;
        probe.register_service(&service.name, target, service.display_name.as_deref());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, ServiceConfig};

    fn config() -> SentinelConfig {
        let mut config = SentinelConfig::default();
        config.services.push(ServiceConfig {
            name: "llm-engine".into(),
            target: "http://127.0.0.1:1/health".into(),
            display_name: Some("LLM Engine".into()),
        });
        config.providers.push(ProviderConfig {
            kind: "cloud".into(),
            endpoint: "http://127.0.0.1:1/speak".into(),
            stream_endpoint: None,
            health_endpoint: None,
        });
        config
    }

    #[tokio::test]
    async fn test_build_registers_services_and_providers() {
        let shutdown = Shutdown::new();
        let sentinel = Sentinel::build(config(), &shutdown).unwrap();

        assert!(sentinel.probe.is_registered("llm-engine"));
        assert_eq!(sentinel.router.registry().len(), 1);
        assert!(sentinel.remote.is_none());
        assert!(sentinel.monitor.monitored_services().await.is_empty());

        sentinel.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_build_rejects_bad_service_target() {
        let mut config = config();
        config.services[0].target = "not a url".into();
        let err = Sentinel::build(config, &Shutdown::new()).err().unwrap();
        assert!(matches!(err, StartupError::Config(ValidationError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_apply_config_registers_and_monitors_new_services() {
        let mut initial = config();
        initial.monitor.interval_ms = 60_000;
        let sentinel = Sentinel::build(initial.clone(), &Shutdown::new()).unwrap();

        // Drive the original target into backoff
        for _ in 0..3 {
            sentinel.probe.check_health("llm-engine").await;
        }
        assert_eq!(sentinel.probe.consecutive_failures("llm-engine"), Some(3));

        let mut reloaded = initial;
        reloaded.services[0].target = "http://127.0.0.1:2/health".into();
        reloaded.services.push(ServiceConfig {
            name: "tts-engine".into(),
            target: "http://127.0.0.1:3/health".into(),
            display_name: None,
        });
        sentinel.apply_config(reloaded).await.unwrap();

        assert!(sentinel.probe.is_registered("tts-engine"));
        assert_eq!(
            sentinel.monitor.monitored_services().await,
            vec!["llm-engine".to_string(), "tts-engine".to_string()]
        );
        assert_eq!(sentinel.config.load().services.len(), 2);

        // New target: bookkeeping restarted, so the first probe really went out
        let endpoint = sentinel.probe.endpoint("llm-engine").unwrap();
        assert_eq!(endpoint.target.as_str(), "http://127.0.0.1:2/health");
        assert_eq!(endpoint.consecutive_failures(), 1);
        let status = sentinel.monitor.get_status("llm-engine").await.unwrap();
        assert_eq!(status.error_code(), Some("CONNECTION_FAILED"));

        sentinel.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_apply_config_rejects_bad_target_and_keeps_snapshot() {
        let sentinel = Sentinel::build(config(), &Shutdown::new()).unwrap();

        let mut reloaded = config();
        reloaded.services[0].target = "not a url".into();
        assert!(sentinel.apply_config(reloaded).await.is_err());

        assert_eq!(
            sentinel.config.load().services[0].target,
            "http://127.0.0.1:1/health"
        );
        sentinel.stop(Duration::from_secs(1)).await;
    }
}
