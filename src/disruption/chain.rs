//! Composition of the counting and injection stages around an upstream.

use axum::{middleware, Router};
use std::sync::Arc;

use crate::disruption::counter::{count_requests, RequestCounter};
use crate::disruption::injector::{inject_faults, FaultInjector};
use crate::disruption::{DISRUPTION_INTERVAL, RESET_THRESHOLD};

/// The two interceptors, in the order requests pass through them.
pub const STAGES: [&str; 2] = ["request_counter", "fault_injector"];

/// Owns the shared counter and the injector that reads it.
///
/// Built once at startup. Every router produced by [`DisruptionChain::wrap`]
/// shares the same counter.
#[derive(Debug, Clone)]
pub struct DisruptionChain {
    counter: Arc<RequestCounter>,
    injector: FaultInjector,
}

impl DisruptionChain {
    /// Chain using the compile-time threshold and interval.
    pub fn new() -> Self {
        Self::with_settings(RESET_THRESHOLD, DISRUPTION_INTERVAL)
    }

    pub fn with_settings(reset_threshold: u64, interval: u64) -> Self {
        let counter = Arc::new(RequestCounter::with_threshold(reset_threshold));
        let injector = FaultInjector::new(counter.clone(), interval);
        Self { counter, injector }
    }

    pub fn counter(&self) -> &Arc<RequestCounter> {
        &self.counter
    }

    pub fn injector(&self) -> &FaultInjector {
        &self.injector
    }

    pub fn stages(&self) -> &'static [&'static str] {
        &STAGES
    }

    /// Wrap `upstream` so the counter runs first and the injector second.
    ///
    /// Layers added later sit further out, hence the injector is applied
    /// before the counter.
    pub fn wrap(&self, upstream: Router) -> Router {
        upstream
            .layer(middleware::from_fn_with_state(
                self.injector.clone(),
                inject_faults,
            ))
            .layer(middleware::from_fn_with_state(
                self.counter.clone(),
                count_requests,
            ))
    }
}

impl Default for DisruptionChain {
    fn default() -> Self {
        Self::new()
    }
}
