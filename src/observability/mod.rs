//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Probes, monitor loops, router attempts produce:
//!     → logging.rs (structured tracing events with service/provider fields)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
