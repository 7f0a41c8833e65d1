//! HTTP-backed capability provider.
//!
//! Posts the request as JSON and treats the response body as the payload.
//! The streaming endpoint is read chunk by chunk as the body arrives.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::validation::{parse_http_url, ValidationError};
use crate::config::ProviderConfig;
use crate::fallback::provider::{
    CapabilityProvider, CapabilityRequest, ChunkStream, ProviderError,
};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HttpCapabilityProvider {
    kind: String,
    client: reqwest::Client,
    endpoint: Url,
    stream_endpoint: Url,
    health_endpoint: Option<Url>,
}

impl HttpCapabilityProvider {
    /// `stream_endpoint` falls back to `endpoint` when absent.
    pub fn new(
        kind: impl Into<String>,
        client: reqwest::Client,
        endpoint: Url,
        stream_endpoint: Option<Url>,
        health_endpoint: Option<Url>,
    ) -> Self {
        let stream_endpoint = stream_endpoint.unwrap_or_else(|| endpoint.clone());
        Self {
            kind: kind.into(),
            client,
            endpoint,
            stream_endpoint,
            health_endpoint,
        }
    }

    pub fn from_config(
        config: &ProviderConfig,
        client: reqwest::Client,
    ) -> Result<Self, ValidationError> {
        let endpoint = parse_http_url("providers.endpoint", &config.endpoint)?;
        let stream_endpoint = config
            .stream_endpoint
            .as_deref()
            .map(|u| parse_http_url("providers.stream_endpoint", u))
            .transpose()?;
        let health_endpoint = config
            .health_endpoint
            .as_deref()
            .map(|u| parse_http_url("providers.health_endpoint", u))
            .transpose()?;

        Ok(Self::new(
            config.kind.clone(),
            client,
            endpoint,
            stream_endpoint,
            health_endpoint,
        ))
    }

    async fn post(
        &self,
        url: &Url,
        request: &CapabilityRequest,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, ProviderError> {
        let send = self.client.post(url.clone()).json(request).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            res = send => res.map_err(|e| ProviderError::Request(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl CapabilityProvider for HttpCapabilityProvider {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn generate(
        &self,
        request: &CapabilityRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ProviderError> {
        let response = self.post(&self.endpoint, request, cancel).await?;
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            body = response.bytes() => body.map_err(|e| ProviderError::Request(e.to_string()))?,
        };
        Ok(body.to_vec())
    }

    async fn stream(
        &self,
        request: &CapabilityRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream, ProviderError> {
        let response = self.post(&self.stream_endpoint, request, cancel).await?;
        let chunks = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| ProviderError::Stream(e.to_string()))
        });
        Ok(chunks.boxed())
    }

    async fn is_healthy(&self) -> bool {
        let Some(url) = &self.health_endpoint else {
            return true;
        };

        match self
            .client
            .get(url.clone())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = %self.kind, error = %e, "Provider health check failed");
                false
            }
        }
    }
}
