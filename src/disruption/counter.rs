//! Request counting stage.
//!
//! # Responsibilities
//! - Hold the process-wide request tally
//! - Apply the soft reset once the tally exceeds the threshold
//! - Tag each request with the number it was assigned

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::disruption::RESET_THRESHOLD;
use crate::observability::metrics;

/// Number assigned to a request by [`RequestCounter::advance`].
///
/// Inserted into request extensions so later stages see the value this
/// request produced rather than whatever the counter holds by then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestNumber(pub u64);

/// Shared request tally.
#[derive(Debug)]
pub struct RequestCounter {
    value: AtomicU64,
    reset_threshold: u64,
}

impl RequestCounter {
    /// Create a counter at zero using the default reset threshold.
    pub fn new() -> Self {
        Self::with_threshold(RESET_THRESHOLD)
    }

    /// Create a counter at zero with a custom reset threshold.
    pub fn with_threshold(reset_threshold: u64) -> Self {
        Self {
            value: AtomicU64::new(0),
            reset_threshold,
        }
    }

    /// Record one request and return its number.
    ///
    /// Soft reset and increment are applied as a single atomic update, so
    /// concurrent callers each receive a distinct value.
    pub fn advance(&self) -> u64 {
        let threshold = self.reset_threshold;
        let previous = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(next_value(current, threshold))
            })
            .unwrap_or_else(|current| current);
        next_value(previous, threshold)
    }

    /// Current counter value.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn reset_threshold(&self) -> u64 {
        self.reset_threshold
    }
}

impl Default for RequestCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reset-then-increment: a value strictly above the threshold restarts at 0
/// before the increment.
fn next_value(current: u64, reset_threshold: u64) -> u64 {
    let base = if current > reset_threshold { 0 } else { current };
    base + 1
}

/// Middleware that advances the counter and always delegates.
pub async fn count_requests(
    State(counter): State<Arc<RequestCounter>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let number = counter.advance();
    request.extensions_mut().insert(RequestNumber(number));
    metrics::record_request(number);

    tracing::trace!(request_number = number, "Request counted");

    next.run(request).await
}
