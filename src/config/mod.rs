//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SentinelConfig (validated, immutable)
//!     → handed to constructors by the composition root
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → daemon re-registers services and swaps the live snapshot
//! ```
//!
//! # Design Decisions
//! - No global registries; every subsystem receives its config section explicitly
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BroadcastConfig, FallbackConfig, MonitorConfig, ObservabilityConfig,
    ProbeConfig, ProviderConfig, SentinelConfig, ServiceConfig,
};
