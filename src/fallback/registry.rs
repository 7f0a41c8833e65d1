//! Ordered provider registry with per-provider cooldown tracking.
//!
//! # Responsibilities
//! - Keep providers in registration (priority) order
//! - Track consecutive failures and the last failure time per provider
//! - Compute the eligible subset for a request
//!
//! # Design Decisions
//! - Order is fixed at construction; only eligibility changes at runtime
//! - Breaker state is behind a tiny per-record lock, never held across awaits

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use crate::config::FallbackConfig;
use crate::fallback::provider::CapabilityProvider;
use crate::health::state::unix_millis;
use crate::observability::metrics;
use crate::resilience::BackoffState;

/// When a provider is taken out of rotation, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub max_failures: u32,
    pub cooldown: Duration,
}

impl From<&FallbackConfig> for CooldownPolicy {
    fn from(config: &FallbackConfig) -> Self {
        Self {
            max_failures: config.max_failures,
            cooldown: config.cooldown(),
        }
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        (&FallbackConfig::default()).into()
    }
}

/// One provider plus its breaker state.
pub struct ProviderRecord {
    provider: Arc<dyn CapabilityProvider>,
    breaker: Mutex<BackoffState>,
}

impl ProviderRecord {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            provider,
            breaker: Mutex::new(BackoffState::new()),
        }
    }

    pub fn kind(&self) -> &str {
        self.provider.kind()
    }

    pub fn provider(&self) -> &Arc<dyn CapabilityProvider> {
        &self.provider
    }

    fn breaker(&self) -> MutexGuard<'_, BackoffState> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn failure_count(&self) -> u32 {
        self.breaker().consecutive_failures
    }

    pub fn in_cooldown(&self, policy: &CooldownPolicy, now: Instant) -> bool {
        self.breaker().in_cooldown(policy.max_failures, policy.cooldown, now)
    }

    pub fn cooldown_expires_at(&self, policy: &CooldownPolicy, now: Instant) -> Option<Instant> {
        self.breaker()
            .cooldown_expires_at(policy.max_failures, policy.cooldown, now)
    }

    /// Reset the breaker, returning the failure count it had.
    pub fn record_success(&self) -> u32 {
        let mut breaker = self.breaker();
        let previous = breaker.consecutive_failures;
        breaker.record_success();
        previous
    }

    /// Count a failure at `now`, returning the new consecutive count.
    pub fn record_failure(&self, now: Instant) -> u32 {
        self.breaker().record_failure(now)
    }

    /// Manual operator reset.
    pub fn reset(&self) {
        self.breaker().reset();
    }
}

impl std::fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("kind", &self.kind())
            .field("breaker", &*self.breaker())
            .finish()
    }
}

/// Diagnostic view of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub kind: String,
    pub available: bool,
    pub failure_count: u32,
    pub in_cooldown: bool,
    /// Milliseconds since the UNIX epoch at which the cooldown ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_expires_at: Option<u64>,
}

/// Fixed, ordered set of interchangeable providers.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    records: Vec<Arc<ProviderRecord>>,
    policy: CooldownPolicy,
}

impl ProviderRegistry {
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            records: Vec::new(),
            policy,
        }
    }

    /// Append a provider at the lowest priority.
    pub fn register(&mut self, provider: Arc<dyn CapabilityProvider>) {
        if self.get(provider.kind()).is_some() {
            tracing::warn!(provider = %provider.kind(), "Duplicate provider kind registered");
        }
        tracing::info!(
            provider = %provider.kind(),
            priority = self.records.len(),
            "Provider registered"
        );
        self.records.push(Arc::new(ProviderRecord::new(provider)));
    }

    pub fn with_provider(mut self, provider: Arc<dyn CapabilityProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    pub fn records(&self) -> &[Arc<ProviderRecord>] {
        &self.records
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<ProviderRecord>> {
        self.records.iter().find(|r| r.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Providers not in cooldown at `now`, in priority order.
    pub fn eligible(&self, now: Instant) -> Vec<Arc<ProviderRecord>> {
        self.records
            .iter()
            .filter(|r| {
                let cooling = r.in_cooldown(&self.policy, now);
                if cooling {
                    tracing::debug!(provider = %r.kind(), failures = r.failure_count(), "Skipping provider in cooldown");
                }
                !cooling
            })
            .cloned()
            .collect()
    }

    /// Promote a provider back to good standing.
    pub fn record_success(&self, record: &ProviderRecord) {
        let previous = record.record_success();
        if previous > 0 {
            tracing::info!(provider = %record.kind(), previous_failures = previous, "Provider recovered");
        }
        metrics::record_provider_cooldown(record.kind(), false);
    }

    /// Count a failure; returns true if this failure put the provider into cooldown.
    pub fn record_failure(&self, record: &ProviderRecord, now: Instant) -> bool {
        let failures = record.record_failure(now);
        let entered = failures == self.policy.max_failures;
        if entered {
            tracing::warn!(
                provider = %record.kind(),
                failures = failures,
                cooldown_ms = self.policy.cooldown.as_millis() as u64,
                "Provider entering cooldown"
            );
            metrics::record_provider_cooldown(record.kind(), true);
        }
        entered
    }

    /// Breaker-only snapshot; availability here ignores the provider's own health.
    pub fn snapshot(&self, now: Instant, wall: SystemTime) -> Vec<ProviderStatus> {
        self.records
            .iter()
            .map(|r| {
                let expires = r.cooldown_expires_at(&self.policy, now);
                ProviderStatus {
                    kind: r.kind().to_string(),
                    available: expires.is_none(),
                    failure_count: r.failure_count(),
                    in_cooldown: expires.is_some(),
                    cooldown_expires_at: expires
                        .map(|at| unix_millis(wall + at.saturating_duration_since(now))),
                }
            })
            .collect()
    }
}
