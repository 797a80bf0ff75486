//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Disruption stages and upstreams produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (request and injection counters)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
