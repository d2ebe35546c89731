//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! resolver / rules / pipeline / upstream produce:
//!     → logging.rs (tracing subscriber, env-filter)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every span via the `x-request-id` header
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
