//! Active health probing.
//!
//! # Responsibilities
//! - Keep the registry of monitored endpoints
//! - Probe one endpoint on demand and classify the outcome
//! - Gate probes of failing endpoints behind jittered exponential backoff

use dashmap::DashMap;
use reqwest::header::USER_AGENT;
use std::time::{Duration, Instant, SystemTime};
use tokio::time;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ProbeConfig;
use crate::error::SentinelError;
use crate::health::endpoint::ServiceEndpoint;
use crate::health::state::{metric, ServiceState, ServiceStatus};
use crate::observability::metrics;
use crate::resilience::backoff::probe_backoff_delay;

const PROBE_USER_AGENT: &str = "service-sentinel-health-check";

/// Performs health checks against registered services.
///
/// Each endpoint's bookkeeping is mutated only by its own probe path; the
/// map itself is sharded so probes of different services never contend.
pub struct HealthProbe {
    endpoints: DashMap<String, ServiceEndpoint>,
    client: reqwest::Client,
    config: ProbeConfig,
}

impl HealthProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: ProbeConfig, client: reqwest::Client) -> Self {
        Self {
            endpoints: DashMap::new(),
            client,
            config,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Register (or overwrite) a service.
    ///
    /// Overwriting with a different target starts the endpoint with clean
    /// bookkeeping; overwriting with the same target only renames it.
    pub fn register_service(&self, name: &str, target: Url, display_name: Option<&str>) {
        let mut entry = self
            .endpoints
            .entry(name.to_string())
            .or_insert_with(|| ServiceEndpoint::new(name, target.clone(), display_name));

        if entry.target != target {
            *entry = ServiceEndpoint::new(name, target, display_name);
        } else if let Some(display) = display_name {
            entry.display_name = display.to_string();
        }

        tracing::info!(
            service = %name,
            target = %entry.target,
            display_name = %entry.display_name,
            "Service registered"
        );
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    /// Registered service names, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.endpoints.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of an endpoint's bookkeeping.
    pub fn endpoint(&self, name: &str) -> Option<ServiceEndpoint> {
        self.endpoints.get(name).map(|e| e.value().clone())
    }

    pub fn consecutive_failures(&self, name: &str) -> Option<u32> {
        self.endpoints.get(name).map(|e| e.consecutive_failures())
    }

    /// Zero the failure counter, clearing any pending backoff.
    pub fn reset_failures(&self, name: &str) -> Result<(), SentinelError> {
        let mut endpoint = self
            .endpoints
            .get_mut(name)
            .ok_or_else(|| SentinelError::NotRegistered(name.to_string()))?;

        let previous = endpoint.backoff.consecutive_failures;
        endpoint.reset();
        tracing::info!(service = %name, previous_failures = previous, "Failure counter reset");
        Ok(())
    }

    /// Probe `name` once.
    pub async fn check_health(&self, name: &str) -> ServiceStatus {
        self.check_health_with(name, &CancellationToken::new()).await
    }

    /// Probe `name` once, aborting (and counting a failure) if `cancel` fires.
    pub async fn check_health_with(&self, name: &str, cancel: &CancellationToken) -> ServiceStatus {
        let target = {
            let Some(endpoint) = self.endpoints.get(name) else {
                tracing::warn!(service = %name, "Health check requested for unregistered service");
                return ServiceStatus::from_error(
                    name,
                    ServiceState::Error,
                    &SentinelError::NotRegistered(name.to_string()),
                );
            };

            if let Some(status) = self.backoff_status(&endpoint, Instant::now()) {
                return status;
            }
            endpoint.target.clone()
        };

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SentinelError::Cancelled),
            res = time::timeout(self.config.timeout(), self.send_probe(target)) => match res {
                Ok(result) => result,
                Err(_) => Err(SentinelError::Timeout(self.config.timeout())),
            },
        };
        let latency = started.elapsed();

        self.record_outcome(name, outcome, latency)
    }

    async fn send_probe(&self, target: Url) -> Result<u16, SentinelError> {
        let response = self
            .client
            .get(target)
            .header(USER_AGENT, PROBE_USER_AGENT)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(SentinelError::ProtocolFailure(status.as_u16()))
        }
    }

    /// Jittered window for `failures`, once the threshold is reached.
    fn backoff_window(&self, failures: u32) -> Option<Duration> {
        (failures >= self.config.max_failures).then(|| {
            probe_backoff_delay(failures, self.config.max_backoff_secs, self.config.jitter)
        })
    }

    /// Offline status if the endpoint is still inside its backoff window.
    fn backoff_status(&self, endpoint: &ServiceEndpoint, now: Instant) -> Option<ServiceStatus> {
        let failures = endpoint.backoff.consecutive_failures;
        if failures < self.config.max_failures {
            return None;
        }

        let remaining = endpoint.backoff_remaining(self.config.max_failures, now)?;

        let next_check_secs = remaining.as_secs_f64().ceil() as u64;
        tracing::debug!(
            service = %endpoint.name,
            failures = failures,
            next_check_in_seconds = next_check_secs,
            "Skipping probe, service is backing off"
        );
        metrics::record_probe(&endpoint.name, ServiceState::Offline, None);

        let err = SentinelError::Backoff { failures, remaining };
        Some(
            ServiceStatus::from_error(&endpoint.name, ServiceState::Offline, &err)
                .with_metric(metric::CONSECUTIVE_FAILURES, failures)
                .with_metric(metric::NEXT_CHECK_IN_SECONDS, next_check_secs)
                .with_metric(metric::PLATFORM, std::env::consts::OS),
        )
    }

    fn record_outcome(
        &self,
        name: &str,
        outcome: Result<u16, SentinelError>,
        latency: Duration,
    ) -> ServiceStatus {
        let Some(mut endpoint) = self.endpoints.get_mut(name) else {
            return ServiceStatus::from_error(
                name,
                ServiceState::Error,
                &SentinelError::NotRegistered(name.to_string()),
            );
        };

        let now = Instant::now();
        endpoint.last_check = Some(now);
        endpoint.last_check_at = Some(SystemTime::now());

        let status = match outcome {
            Ok(code) => {
                endpoint.record_success();
                endpoint.last_response_time = Some(latency);

                let state = ServiceState::from_latency(latency, self.config.fast_latency());
                tracing::debug!(
                    service = %name,
                    state = %state,
                    latency_ms = latency.as_millis() as u64,
                    "Health check succeeded"
                );
                metrics::record_probe(name, state, Some(latency));

                ServiceStatus::new(name, state)
                    .with_heartbeat(SystemTime::now())
                    .with_metric(metric::LATENCY_MS, latency.as_millis() as u64)
                    .with_metric(metric::STATUS_CODE, code)
                    .with_metric(metric::CONSECUTIVE_FAILURES, 0u32)
            }
            Err(err) => {
                let failures = endpoint.record_failure(now, |n| self.backoff_window(n));
                let state = match err {
                    SentinelError::Timeout(_)
                    | SentinelError::Cancelled
                    | SentinelError::ConnectionFailure(_) => ServiceState::Offline,
                    _ => ServiceState::Error,
                };
                tracing::warn!(
                    service = %name,
                    state = %state,
                    error = %err,
                    failures = failures,
                    latency_ms = latency.as_millis() as u64,
                    "Health check failed"
                );
                if failures == self.config.max_failures {
                    tracing::warn!(service = %name, failures = failures, "Service entering probe backoff");
                }
                metrics::record_probe(name, state, Some(latency));

                let mut status = ServiceStatus::from_error(name, state, &err)
                    .with_metric(metric::CONSECUTIVE_FAILURES, failures);
                if let SentinelError::ProtocolFailure(code) = err {
                    status = status.with_metric(metric::STATUS_CODE, code);
                }
                status
            }
        };

        status.with_metric(metric::PLATFORM, std::env::consts::OS)
    }
}

fn classify_transport_error(e: reqwest::Error) -> SentinelError {
    if e.is_timeout() {
        SentinelError::Timeout(Duration::ZERO)
    } else if e.is_connect() || e.is_request() {
        SentinelError::ConnectionFailure(e.to_string())
    } else {
        SentinelError::UnexpectedFailure(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> HealthProbe {
        HealthProbe::new(ProbeConfig::default())
    }

    #[tokio::test]
    async fn test_unregistered_service_fails_fast() {
        let status = probe().check_health("ghost").await;
        assert_eq!(status.state, ServiceState::Error);
        assert_eq!(status.error_code(), Some("NOT_REGISTERED"));
    }

    #[test]
    fn test_register_overwrites() {
        let p = probe();
        let target: Url = "http://127.0.0.1:1/health".parse().unwrap();
        p.register_service("llm-engine", target.clone(), None);
        assert_eq!(p.endpoint("llm-engine").unwrap().display_name, "llm-engine");

        p.register_service("llm-engine", target, Some("LLM Engine"));
        assert_eq!(p.endpoint("llm-engine").unwrap().display_name, "LLM Engine");
        assert_eq!(p.service_names(), vec!["llm-engine".to_string()]);
    }

    #[test]
    fn test_reset_unregistered() {
        assert_eq!(
            probe().reset_failures("ghost"),
            Err(SentinelError::NotRegistered("ghost".into()))
        );
    }

    #[test]
    fn test_backoff_gate_only_after_threshold() {
        let p = probe();
        let now = Instant::now();
        let mut endpoint = ServiceEndpoint::new("svc", "http://127.0.0.1:1/".parse().unwrap(), None);

        endpoint.record_failure(now, |n| p.backoff_window(n));
        endpoint.record_failure(now, |n| p.backoff_window(n));
        assert!(p.backoff_status(&endpoint, now).is_none());

        endpoint.record_failure(now, |n| p.backoff_window(n));
        let status = p.backoff_status(&endpoint, now).unwrap();
        assert_eq!(status.state, ServiceState::Offline);
        assert_eq!(status.error_code(), Some("BACKOFF"));
        // 2^3 = 8s, up to +30% jitter
        let next = status.metric(metric::NEXT_CHECK_IN_SECONDS).and_then(|v| v.as_u64()).unwrap();
        assert!((8..=11).contains(&next), "next_check_in_seconds = {}", next);

        // Past the longest possible window (8s * 1.3) the gate is open again
        assert!(p.backoff_status(&endpoint, now + Duration::from_millis(10_500)).is_none());
    }

    #[test]
    fn test_backoff_window_is_fixed_between_failures() {
        let p = probe();
        let now = Instant::now();
        let mut endpoint = ServiceEndpoint::new("svc", "http://127.0.0.1:1/".parse().unwrap(), None);
        for _ in 0..3 {
            endpoint.record_failure(now, |n| p.backoff_window(n));
        }
        let window = endpoint.backoff_window.unwrap();
        assert!(window >= Duration::from_secs(8) && window < Duration::from_secs_f64(8.0 * 1.3));

        let next_check = |at: Instant| {
            p.backoff_status(&endpoint, at)
                .and_then(|s| s.metric(metric::NEXT_CHECK_IN_SECONDS).and_then(|v| v.as_u64()))
        };

        // Repeated checks at one instant agree on both the gate and the countdown
        let mid = now + Duration::from_secs(5);
        let first = next_check(mid);
        assert!(first.is_some());
        for _ in 0..200 {
            assert_eq!(next_check(mid), first);
        }

        let edge = now + Duration::from_millis(9_200);
        let gated = next_check(edge).is_some();
        assert_eq!(gated, window > Duration::from_millis(9_200));
        for _ in 0..200 {
            assert_eq!(next_check(edge).is_some(), gated);
        }

        // Open exactly when the drawn window elapses
        assert!(next_check(now + window - Duration::from_millis(1)).is_some());
        assert!(next_check(now + window).is_none());
    }

    #[test]
    fn test_reset_clears_drawn_window() {
        let p = probe();
        p.register_service("svc", "http://127.0.0.1:1/".parse().unwrap(), None);
        p.endpoints.get_mut("svc").unwrap().record_failure(Instant::now(), |_| {
            Some(Duration::from_secs(60))
        });

        p.reset_failures("svc").unwrap();
        let endpoint = p.endpoint("svc").unwrap();
        assert_eq!(endpoint.consecutive_failures(), 0);
        assert!(endpoint.backoff_window.is_none());
    }
}
