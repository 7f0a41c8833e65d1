//! Error taxonomy shared by the health, monitoring and fallback subsystems.
//!
//! # Design Decisions
//! - Probe failures never escape as errors; they are folded into a
//!   `ServiceStatus` carrying the matching `code()`
//! - Only registry misuse and `NoProvidersAvailable` reach callers as `Err`

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the orchestration core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SentinelError {
    /// Operation on a service name that was never registered.
    #[error("Service '{0}' is not registered")]
    NotRegistered(String),

    /// Probe skipped because the endpoint is still backing off.
    #[error("Service in backoff after {failures} consecutive failures")]
    Backoff { failures: u32, remaining: Duration },

    /// Probe or provider call exceeded its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Probe or provider call was cancelled by the caller.
    #[error("Request cancelled")]
    Cancelled,

    /// Transport-level failure (connection refused, DNS, TLS).
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    /// The remote answered with a non-success status code.
    #[error("HTTP {0}")]
    ProtocolFailure(u16),

    /// Anything that does not fit the categories above.
    #[error("Unexpected failure: {0}")]
    UnexpectedFailure(String),

    /// Every provider in the fallback chain is cooling down (or closed).
    #[error("No providers available")]
    NoProvidersAvailable,
}

impl SentinelError {
    /// Stable machine-readable code, published as the `error_code` metric.
    pub fn code(&self) -> String {
        match self {
            SentinelError::NotRegistered(_) => "NOT_REGISTERED".to_string(),
            SentinelError::Backoff { .. } => "BACKOFF".to_string(),
            SentinelError::Timeout(_) => "TIMEOUT".to_string(),
            SentinelError::Cancelled => "CANCELLED".to_string(),
            SentinelError::ConnectionFailure(_) => "CONNECTION_FAILED".to_string(),
            SentinelError::ProtocolFailure(code) => format!("HTTP_{}", code),
            SentinelError::UnexpectedFailure(_) => "UNKNOWN".to_string(),
            SentinelError::NoProvidersAvailable => "NO_PROVIDERS".to_string(),
        }
    }
}

/// Result type for orchestration operations.
pub type SentinelResult<T> = Result<T, SentinelError>;
