//! Periodic fault injection stage.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::disruption::counter::{RequestCounter, RequestNumber};
use crate::disruption::DISRUPTION_INTERVAL;
use crate::observability::metrics;

/// Body of every injected failure.
pub const FAILURE_BODY: &str = "Simulated intermittent failure";

/// Decides whether a request is failed instead of forwarded.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    counter: Arc<RequestCounter>,
    interval: u64,
}

impl FaultInjector {
    /// Create an injector reading `counter`, failing every `interval`th request.
    ///
    /// An interval of zero never injects.
    pub fn new(counter: Arc<RequestCounter>, interval: u64) -> Self {
        Self { counter, interval }
    }

    /// Injector with the default disruption interval.
    pub fn with_default_interval(counter: Arc<RequestCounter>) -> Self {
        Self::new(counter, DISRUPTION_INTERVAL)
    }

    /// Decision rule: fail when `value` is an exact multiple of the interval.
    pub fn should_inject(&self, value: u64) -> bool {
        value.checked_rem(self.interval) == Some(0)
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Number for this request, falling back to the live counter when the
    /// counting stage did not run.
    fn request_number(&self, request: &Request<Body>) -> u64 {
        request
            .extensions()
            .get::<RequestNumber>()
            .map(|number| number.0)
            .unwrap_or_else(|| self.counter.current())
    }
}

/// The synthetic failure response.
pub fn simulated_failure() -> Response {
    let mut response = Response::new(Body::from(FAILURE_BODY));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Middleware that short-circuits with a 500 on every `interval`th request.
pub async fn inject_faults(
    State(injector): State<FaultInjector>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let number = injector.request_number(&request);

    if injector.should_inject(number) {
        tracing::info!(
            request_number = number,
            method = %request.method(),
            path = %request.uri().path(),
            "Simulating intermittent failure"
        );
        metrics::record_injected_failure();
        return simulated_failure();
    }

    next.run(request).await
}
