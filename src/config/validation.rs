//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FlakyConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{FlakyConfig, UpstreamMode};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid listener.bind_address '{0}'")]
    BindAddress(String),

    #[error("upstream.address is required in proxy mode")]
    MissingUpstreamAddress,

    #[error("invalid upstream.address '{0}'")]
    UpstreamAddress(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("limits.{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("invalid observability.metrics_address '{0}'")]
    MetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &FlakyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.upstream.mode == UpstreamMode::Proxy {
        let address = config.upstream.address.trim();
        if address.is_empty() {
            errors.push(ValidationError::MissingUpstreamAddress);
        } else if address.parse::<axum::http::uri::Authority>().is_err() {
            errors.push(ValidationError::UpstreamAddress(address.to_string()));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::ZeroLimit("max_body_size"));
    }
    if config.limits.max_open_uploads == 0 {
        errors.push(ValidationError::ZeroLimit("max_open_uploads"));
    }
    if config.limits.upload_ttl_secs == 0 {
        errors.push(ValidationError::ZeroLimit("upload_ttl_secs"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
