//! Adaptive health monitoring and provider fallback orchestration.

pub mod admin;
pub mod bus;
pub mod config;
pub mod error;
pub mod fallback;
pub mod health;
pub mod lifecycle;
pub mod monitor;
pub mod observability;
pub mod resilience;

pub use config::schema::SentinelConfig;
pub use error::{SentinelError, SentinelResult};
pub use lifecycle::{Sentinel, Shutdown};
