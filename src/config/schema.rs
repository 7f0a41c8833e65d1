//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the sentinel.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the health & fallback orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SentinelConfig {
    /// Polling loop settings.
    pub monitor: MonitorConfig,

    /// Health probe settings (timeouts, latency banding, backoff).
    pub probe: ProbeConfig,

    /// Services to register and monitor.
    pub services: Vec<ServiceConfig>,

    /// Fallback router cooldown policy.
    pub fallback: FallbackConfig,

    /// Capability providers, in priority order (best first).
    pub providers: Vec<ProviderConfig>,

    /// Remote status broadcast channel.
    pub broadcast: BroadcastConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Status monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between probes of the same service, in milliseconds.
    pub interval_ms: u64,

    /// Capacity of the local status notification channel.
    pub channel_capacity: usize,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            channel_capacity: 256,
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Responses faster than this are `Online`; slower successes are `Degraded`.
    pub fast_latency_ms: u64,

    /// Consecutive failures before probes start backing off.
    pub max_failures: u32,

    /// Upper bound of the exponential backoff, in seconds.
    pub max_backoff_secs: u64,

    /// Upper bound (exclusive) of the multiplicative jitter, e.g. 0.3 for +30%.
    pub jitter: f64,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn fast_latency(&self) -> Duration {
        Duration::from_millis(self.fast_latency_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            fast_latency_ms: 100,
            max_failures: 3,
            max_backoff_secs: 300,
            jitter: 0.3,
        }
    }
}

/// A monitored service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    /// Logical service name (e.g., "llm-engine").
    pub name: String,

    /// Probe target URL (e.g., "http://127.0.0.1:11434/health").
    pub target: String,

    /// Human-friendly name; defaults to `name`.
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Fallback router configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Consecutive failures before a provider enters cooldown.
    pub max_failures: u32,

    /// Cooldown duration in milliseconds.
    pub cooldown_ms: u64,

    /// Deadline for a single provider attempt in milliseconds.
    pub attempt_timeout_ms: u64,
}

impl FallbackConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            cooldown_ms: 300_000,
            attempt_timeout_ms: 30_000,
        }
    }
}

/// HTTP capability provider definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProviderConfig {
    /// Provider type identifier (e.g., "cloud-tts", "local-tts").
    pub kind: String,

    /// Endpoint receiving `generate` requests.
    pub endpoint: String,

    /// Endpoint receiving `stream` requests; defaults to `endpoint`.
    #[serde(default)]
    pub stream_endpoint: Option<String>,

    /// Optional endpoint checked by `is_healthy`.
    #[serde(default)]
    pub health_endpoint: Option<String>,
}

/// Remote broadcast configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Enable the remote status channel.
    pub enabled: bool,

    /// WebSocket URL of the pub/sub relay.
    pub url: String,

    /// Channel name stamped on every frame; frames for other channels are ignored.
    pub channel: String,

    /// Outbound queue capacity.
    pub queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "ws://127.0.0.1:9000/status".to_string(),
            channel: "service-status".to_string(),
            queue_capacity: 256,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
