//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Health probe / provider attempt:
//!     → circuit_breaker.rs (is the target in its open window?)
//!     → backoff.rs (how long is the window for this failure count?)
//!     → attempt result feeds back into circuit_breaker.rs
//! ```
//!
//! # Design Decisions
//! - Backoff computation never sleeps; it only gates whether an attempt starts
//! - Breaker state is per target (endpoint or provider), never global
//! - All time-dependent checks take `now` so they can be tested deterministically

pub mod backoff;
pub mod circuit_breaker;

pub use circuit_breaker::BackoffState;
