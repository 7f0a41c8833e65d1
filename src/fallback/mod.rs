//! Provider registry and fallback routing.
//!
//! # Responsibilities
//! - Hold interchangeable providers of one capability in priority order
//! - Take repeatedly failing providers out of rotation for a cooldown window
//! - Serve requests from the best eligible provider, falling back in order
//!
//! # Data Flow
//! ```text
//! CapabilityRequest ──► FallbackRouter ──► ProviderRegistry::eligible
//!                              │
//!                              └──► CapabilityProvider (HTTP, ...)
//! ```

pub mod http;
pub mod provider;
pub mod registry;
pub mod router;

pub use http::HttpCapabilityProvider;
pub use provider::{CapabilityProvider, CapabilityRequest, ChunkStream, ProviderError};
pub use registry::{CooldownPolicy, ProviderRecord, ProviderRegistry, ProviderStatus};
pub use router::FallbackRouter;
