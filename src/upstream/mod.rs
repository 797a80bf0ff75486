//! Upstream handlers.
//!
//! Whatever serves requests the injector lets through. The disruption chain
//! treats it as an opaque router and never inspects what it returns.
//!
//! - registry/ : built-in in-memory artifact registry
//! - proxy.rs  : forward to a remote registry

pub mod proxy;
pub mod registry;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{FlakyConfig, UpstreamMode};

pub use proxy::ProxyError;

/// Build the configured upstream.
pub fn build(config: &FlakyConfig) -> Result<Router, ProxyError> {
    match config.upstream.mode {
        UpstreamMode::Memory => {
            tracing::info!("Serving in-memory registry");
            let store = registry::RegistryStore::with_upload_limits(
                config.limits.max_open_uploads,
                Duration::from_secs(config.limits.upload_ttl_secs),
            );
            Ok(registry::router(Arc::new(store), config.limits.max_body_size))
        }
        UpstreamMode::Proxy => proxy::router(
            &config.upstream.address,
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.request_secs),
        ),
    }
}
