//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (endpoint.rs):
//!     register_service(name, target, display_name?)
//!     → ServiceEndpoint stored in the probe registry
//!
//! Active probing (active.rs):
//!     check_health(name)
//!     → backoff gate (resilience::circuit_breaker)
//!     → timed GET to target
//!     → classify into ServiceStatus (state.rs)
//!     → update endpoint bookkeeping
//! ```
//!
//! # Design Decisions
//! - Probing never returns an error; every outcome is a classified status
//! - Backoff only gates whether a probe starts; it never sleeps
//! - Bookkeeping is per endpoint; one failing service never affects another

pub mod active;
pub mod endpoint;
pub mod state;

pub use active::HealthProbe;
pub use endpoint::ServiceEndpoint;
pub use state::{ServiceState, ServiceStatus};
