//! Forwarding upstream.
//!
//! Sends every request to a single backend registry and relays the
//! response untouched. Only scheme and authority of the URI are rewritten.
//! A backend that misses the request deadline is answered with `504` here,
//! so the deadline never rewrites a response outside the upstream.

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, InvalidUriParts, PathAndQuery, Scheme},
        Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid backend address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: axum::http::uri::InvalidUri,
    },
}

#[derive(Clone)]
struct ProxyState {
    client: Client<HttpConnector, Body>,
    backend: Authority,
    request_timeout: Duration,
}

/// Build a router that forwards everything to `address`.
pub fn router(
    address: &str,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Router, ProxyError> {
    let backend: Authority = address
        .trim()
        .parse()
        .map_err(|source| ProxyError::InvalidAddress {
            address: address.to_string(),
            source,
        })?;

    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    let client = Client::builder(TokioExecutor::new()).build(connector);

    tracing::info!(
        backend = %backend,
        request_timeout_secs = request_timeout.as_secs_f64(),
        "Proxy upstream configured"
    );

    Ok(Router::new().fallback(forward).with_state(ProxyState {
        client,
        backend,
        request_timeout,
    }))
}

/// Point `uri` at the backend, keeping path and query.
fn backend_uri(uri: &Uri, backend: &Authority) -> Result<Uri, InvalidUriParts> {
    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority = Some(backend.clone());
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    Uri::from_parts(parts)
}

async fn forward(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let (mut parts, body) = request.into_parts();

    parts.uri = match backend_uri(&parts.uri, &state.backend) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(uri = %parts.uri, error = %e, "Could not rewrite request URI");
            return (StatusCode::BAD_REQUEST, "Invalid request URI").into_response();
        }
    };

    tracing::debug!(method = %parts.method, uri = %parts.uri, "Forwarding request");

    let pending = state.client.request(Request::from_parts(parts, body));
    match tokio::time::timeout(state.request_timeout, pending).await {
        Ok(Ok(response)) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Ok(Err(e)) => {
            tracing::error!(backend = %state.backend, error = %e, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
        Err(_) => {
            tracing::warn!(
                backend = %state.backend,
                timeout_secs = state.request_timeout.as_secs_f64(),
                "Upstream timed out"
            );
            (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out").into_response()
        }
    }
}
