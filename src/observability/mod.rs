//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for log shipping)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (`listener`, `consumer`, `entry_id`, ...)
//! - Request IDs are set and propagated by the HTTP listener's middleware
//! - Metric updates go through the `metrics` facade and are no-ops until an
//!   exporter is installed

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use self::metrics::init_metrics;
