//! Intermittent-failure registry front.
//!
//! Wraps an artifact registry in a two-stage middleware chain that counts
//! requests and fails every 50th one with a synthetic 500, for exercising
//! client retry logic.

pub mod config;
pub mod disruption;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod upstream;

pub use config::FlakyConfig;
pub use disruption::{DisruptionChain, FaultInjector, RequestCounter};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
