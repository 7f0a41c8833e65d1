//! Ordered fallback across interchangeable providers.
//!
//! # Responsibilities
//! - Try eligible providers in priority order until one succeeds
//! - Bound every attempt by a timeout and the caller's cancellation
//! - Feed outcomes back into the registry's cooldown bookkeeping
//!
//! # Data Flow
//! ```text
//! request ──► eligible(now) ──► provider[0] ──fail──► provider[1] ──ok──► payload
//!                 │                                   (record_failure)  (record_success)
//!                 └─ empty ──► NoProvidersAvailable
//! ```
//!
//! # Design Decisions
//! - Exhausting every provider yields an empty payload, not an error
//! - A streaming attempt is drained completely before any chunk is released,
//!   so a provider failing mid-stream never leaks partial output

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::FallbackConfig;
use crate::error::{SentinelError, SentinelResult};
use crate::fallback::provider::{CapabilityProvider, CapabilityRequest, ProviderError};
use crate::fallback::registry::{
    CooldownPolicy, ProviderRecord, ProviderRegistry, ProviderStatus,
};
use crate::observability::metrics;

/// Why a single provider attempt did not produce a payload.
#[derive(Debug)]
enum AttemptFailure {
    Empty,
    Provider(ProviderError),
    Timeout(Duration),
    Cancelled,
}

impl AttemptFailure {
    fn outcome(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Provider(_) => "error",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty payload"),
            Self::Provider(e) => write!(f, "{}", e),
            Self::Timeout(d) => write!(f, "timed out after {}ms", d.as_millis()),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Run one attempt under the per-attempt timeout and the caller's token.
async fn bounded<F, T>(
    fut: F,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T, AttemptFailure>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AttemptFailure::Cancelled),
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(ProviderError::Cancelled)) => Err(AttemptFailure::Cancelled),
            Ok(Err(e)) => Err(AttemptFailure::Provider(e)),
            Err(_) => Err(AttemptFailure::Timeout(timeout)),
        },
    }
}

/// Pull a provider's stream to completion, keeping only non-empty chunks.
async fn drain(
    provider: &dyn CapabilityProvider,
    request: &CapabilityRequest,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<u8>>, ProviderError> {
    let mut stream = provider.stream(request, cancel).await?;
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
    }
    Ok(chunks)
}

/// Registry plus the attempt policy; shared between request paths.
struct Chain {
    registry: ProviderRegistry,
    attempt_timeout: Duration,
}

impl Chain {
    fn settle_success(&self, record: &ProviderRecord) {
        metrics::record_provider_attempt(record.kind(), "success");
        self.registry.record_success(record);
    }

    fn settle_failure(&self, record: &ProviderRecord, failure: &AttemptFailure) {
        tracing::warn!(
            provider = %record.kind(),
            outcome = failure.outcome(),
            error = %failure,
            "Provider attempt failed"
        );
        metrics::record_provider_attempt(record.kind(), failure.outcome());
        self.registry.record_failure(record, Instant::now());
    }

    async fn generate(
        &self,
        eligible: Vec<Arc<ProviderRecord>>,
        request: &CapabilityRequest,
        cancel: &CancellationToken,
    ) -> Vec<u8> {
        let attempts = eligible.len();
        for record in eligible {
            tracing::debug!(provider = %record.kind(), "Attempting provider");
            let result = bounded(
                record.provider().generate(request, cancel),
                self.attempt_timeout,
                cancel,
            )
            .await
            .and_then(|data| {
                if data.is_empty() {
                    Err(AttemptFailure::Empty)
                } else {
                    Ok(data)
                }
            });

            match result {
                Ok(data) => {
                    self.settle_success(&record);
                    tracing::debug!(provider = %record.kind(), bytes = data.len(), "Provider succeeded");
                    return data;
                }
                Err(failure) => {
                    self.settle_failure(&record, &failure);
                    if matches!(failure, AttemptFailure::Cancelled) {
                        tracing::info!("Request cancelled, abandoning fallback chain");
                        return Vec::new();
                    }
                }
            }
        }

        tracing::warn!(attempts = attempts, "All providers failed");
        Vec::new()
    }

    async fn stream(
        &self,
        eligible: Vec<Arc<ProviderRecord>>,
        request: CapabilityRequest,
        cancel: CancellationToken,
    ) -> Vec<Vec<u8>> {
        let attempts = eligible.len();
        for record in eligible {
            tracing::debug!(provider = %record.kind(), "Attempting streaming provider");
            let result = bounded(
                drain(record.provider().as_ref(), &request, &cancel),
                self.attempt_timeout,
                &cancel,
            )
            .await
            .and_then(|chunks| {
                if chunks.is_empty() {
                    Err(AttemptFailure::Empty)
                } else {
                    Ok(chunks)
                }
            });

            match result {
                Ok(chunks) => {
                    self.settle_success(&record);
                    tracing::debug!(provider = %record.kind(), chunks = chunks.len(), "Streaming provider succeeded");
                    return chunks;
                }
                Err(failure) => {
                    // Buffered chunks from this attempt are dropped here
                    self.settle_failure(&record, &failure);
                    if matches!(failure, AttemptFailure::Cancelled) {
                        tracing::info!("Stream cancelled, abandoning fallback chain");
                        return Vec::new();
                    }
                }
            }
        }

        tracing::warn!(attempts = attempts, "All streaming providers failed");
        Vec::new()
    }
}

/// Routes capability requests across an ordered provider registry.
pub struct FallbackRouter {
    chain: Arc<Chain>,
    closed: AtomicBool,
}

impl FallbackRouter {
    pub fn new(registry: ProviderRegistry, attempt_timeout: Duration) -> Self {
        Self {
            chain: Arc::new(Chain {
                registry,
                attempt_timeout,
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Build a router over `providers`, highest priority first.
    pub fn from_config(
        providers: Vec<Arc<dyn CapabilityProvider>>,
        config: &FallbackConfig,
    ) -> Self {
        let mut registry = ProviderRegistry::new(CooldownPolicy::from(config));
        for provider in providers {
            registry.register(provider);
        }
        Self::new(registry, config.attempt_timeout())
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.chain.registry
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn eligible(&self) -> SentinelResult<Vec<Arc<ProviderRecord>>> {
        if self.is_closed() {
            return Err(SentinelError::NoProvidersAvailable);
        }
        let eligible = self.chain.registry.eligible(Instant::now());
        if eligible.is_empty() {
            tracing::warn!(
                registered = self.chain.registry.len(),
                "No providers available"
            );
            return Err(SentinelError::NoProvidersAvailable);
        }
        Ok(eligible)
    }

    /// Produce a payload from the first provider that succeeds.
    ///
    /// Fails only when no provider is eligible. If every eligible provider
    /// fails, or `cancel` fires, the payload is empty.
    pub async fn execute(
        &self,
        request: &CapabilityRequest,
        cancel: &CancellationToken,
    ) -> SentinelResult<Vec<u8>> {
        let eligible = self.eligible()?;
        Ok(self.chain.generate(eligible, request, cancel).await)
    }

    /// Streaming variant of [`execute`](Self::execute).
    ///
    /// Eligibility is checked now; the providers are tried when the returned
    /// stream is first polled. Chunks from a provider are yielded only after
    /// it finished successfully.
    pub fn stream_execute(
        &self,
        request: CapabilityRequest,
        cancel: CancellationToken,
    ) -> SentinelResult<BoxStream<'static, Vec<u8>>> {
        let eligible = self.eligible()?;
        let chain = self.chain.clone();
        let attempt = async move { chain.stream(eligible, request, cancel).await };
        Ok(stream::once(attempt).flat_map(stream::iter).boxed())
    }

    /// Per-provider diagnostics, including each provider's own health check.
    pub async fn status(&self) -> Vec<ProviderStatus> {
        let registry = &self.chain.registry;
        let mut statuses = registry.snapshot(Instant::now(), SystemTime::now());
        let closed = self.is_closed();

        for (status, record) in statuses.iter_mut().zip(registry.records()) {
            if status.available {
                status.available = !closed && record.provider().is_healthy().await;
            }
        }
        statuses
    }

    /// Release every provider exactly once. Later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Fallback router already shut down");
            return;
        }

        let mut failures = 0usize;
        for record in self.chain.registry.records() {
            match record.provider().close().await {
                Ok(()) => tracing::debug!(provider = %record.kind(), "Provider closed"),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(provider = %record.kind(), error = %e, "Provider close failed");
                }
            }
        }

        tracing::info!(
            providers = self.chain.registry.len(),
            failures = failures,
            "Fallback router shut down"
        );
    }
}

impl std::fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRouter")
            .field("registry", &self.chain.registry)
            .field("attempt_timeout", &self.chain.attempt_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}
