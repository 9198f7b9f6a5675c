//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → audit.rs (per-request audit records, best effort)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON or pretty)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Audit target (`audit` tracing target, or a custom sink)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every stage and the audit record
//! - Metrics are cheap (atomic increments)
//! - Audit failures never reject traffic

pub mod audit;
pub mod logging;
pub mod metrics;
