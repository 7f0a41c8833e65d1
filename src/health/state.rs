//! Service health states and status snapshots.
//!
//! # States
//! - Online: probe succeeded below the fast-latency threshold
//! - Degraded: probe succeeded but slowly
//! - Offline: unreachable (timeout, connection failure, backing off)
//! - Error: reachable but misbehaving (non-2xx, unexpected failure, unknown service)
//!
//! # Dedupe
//! Two statuses are equal when name, state, error message and the
//! `latency_ms` metric match. Other metrics (failure counters, countdowns)
//! never trigger a republish on their own.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::SentinelError;

/// Metric keys carried in [`ServiceStatus::metrics`].
pub mod metric {
    pub const LATENCY_MS: &str = "latency_ms";
    pub const STATUS_CODE: &str = "status_code";
    pub const CONSECUTIVE_FAILURES: &str = "consecutive_failures";
    pub const PLATFORM: &str = "platform";
    pub const ERROR_CODE: &str = "error_code";
    pub const NEXT_CHECK_IN_SECONDS: &str = "next_check_in_seconds";
}

/// Classified health of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Online,
    Degraded,
    Offline,
    Error,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Online => "online",
            ServiceState::Degraded => "degraded",
            ServiceState::Offline => "offline",
            ServiceState::Error => "error",
        }
    }

    /// Online or Degraded.
    pub fn is_up(&self) -> bool {
        matches!(self, ServiceState::Online | ServiceState::Degraded)
    }

    /// Band a successful response by its latency.
    pub fn from_latency(latency: Duration, fast_threshold: Duration) -> Self {
        if latency < fast_threshold {
            ServiceState::Online
        } else {
            ServiceState::Degraded
        }
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot produced by a probe (or received from a remote peer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub state: ServiceState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds since the UNIX epoch of the last successful response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<u64>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
}

impl ServiceStatus {
    pub fn new(name: impl Into<String>, state: ServiceState) -> Self {
        Self {
            name: name.into(),
            state,
            error: None,
            last_heartbeat: None,
            metrics: BTreeMap::new(),
        }
    }

    /// Status describing a classified failure, tagged with its error code.
    pub fn from_error(name: impl Into<String>, state: ServiceState, error: &SentinelError) -> Self {
        Self::new(name, state)
            .with_error(error.to_string())
            .with_metric(metric::ERROR_CODE, error.code())
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_heartbeat(mut self, at: SystemTime) -> Self {
        self.last_heartbeat = Some(unix_millis(at));
        self
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }

    pub fn metric(&self, key: &str) -> Option<&Value> {
        self.metrics.get(key)
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.metric(metric::LATENCY_MS).and_then(Value::as_u64)
    }

    pub fn error_code(&self) -> Option<&str> {
        self.metric(metric::ERROR_CODE).and_then(Value::as_str)
    }
}

impl PartialEq for ServiceStatus {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.state == other.state
            && self.error == other.error
            && self.metric(metric::LATENCY_MS) == other.metric(metric::LATENCY_MS)
    }
}

impl Eq for ServiceStatus {}

/// Milliseconds since the UNIX epoch.
pub fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
