//! Capability provider contract.
//!
//! Every interchangeable provider (cloud speech, local speech, ...) exposes
//! the same narrow surface; the router never inspects concrete types.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Lazily produced payload chunks.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, ProviderError>>;

/// Request shape shared by `generate` and `stream`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// Primary input (e.g., the text to speak).
    pub input: String,
    /// Provider-agnostic options (voice, speed, format, ...).
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl CapabilityRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Errors raised by a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("provider stream failed: {0}")]
    Stream(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider call cancelled")]
    Cancelled,
}

/// A provider of one logical capability.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Provider type identifier, unique within a registry.
    fn kind(&self) -> &str;

    /// Produce the whole payload at once.
    async fn generate(
        &self,
        request: &CapabilityRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ProviderError>;

    /// Produce the payload as a sequence of chunks.
    async fn stream(
        &self,
        request: &CapabilityRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, ProviderError>;

    /// Provider's own view of its health, used for diagnostics.
    async fn is_healthy(&self) -> bool {
        true
    }

    /// Release owned resources. Called exactly once on router shutdown.
    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
