//! Status monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! start_monitoring(name)
//!     → session.rs (cancellation token + task handle, one per name)
//!     → immediate probe, then one probe per interval (service.rs)
//!     → dedupe against last stored status
//!     → on change: store, StatusBus::publish, RemoteChannel::publish
//!
//! Remote inbound status
//!     → apply_remote: store + local publish, no re-broadcast
//! ```
//!
//! # Design Decisions
//! - One tokio task per service; probes of one service never overlap
//! - A single async mutex guards the status map and session table
//! - Results are applied only if their session is still the active one,
//!   so nothing from a stopped session is published after stop returns

pub mod service;
pub mod session;

pub use service::StatusMonitor;
pub use session::MonitoringSession;
