//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the upstream handler from configuration
//! - Wrap it in the disruption chain
//! - Wire up ambient middleware (tracing, request ID)
//!
//! No layer outside the chain may rewrite a response. Request deadlines are
//! enforced by the proxy upstream, which answers for itself.
//! - Serve on a listener until shutdown

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::FlakyConfig;
use crate::disruption::DisruptionChain;
use crate::http::request;
use crate::lifecycle::shutdown;
use crate::upstream::{self, ProxyError};

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error(transparent)]
    Upstream(#[from] ProxyError),
}

/// Bind the listening socket.
pub async fn bind_listener(address: &str) -> Result<TcpListener, ServeError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| ServeError::Bind {
            address: address.to_string(),
            source,
        })
}

/// HTTP server: upstream wrapped by the disruption chain.
pub struct HttpServer {
    router: Router,
    config: FlakyConfig,
    chain: DisruptionChain,
}

impl HttpServer {
    /// Create a server with the upstream selected by `config`.
    pub fn new(config: FlakyConfig) -> Result<Self, ServeError> {
        let upstream = upstream::build(&config)?;
        Ok(Self::with_upstream(config, upstream))
    }

    /// Create a server around a caller-supplied upstream.
    pub fn with_upstream(config: FlakyConfig, upstream: Router) -> Self {
        let chain = DisruptionChain::new();
        let router = Self::build_router(&chain, upstream);
        Self {
            router,
            config,
            chain,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(chain: &DisruptionChain, upstream: Router) -> Router {
        chain
            .wrap(upstream)
            .layer(TraceLayer::new_for_http().make_span_with(request::make_span))
            .layer(request::set_request_id_layer())
    }

    /// Run the server until `shutdown_rx` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), ServeError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            stages = ?self.chain.stages(),
            "Listening"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn chain(&self) -> &DisruptionChain {
        &self.chain
    }

    pub fn config(&self) -> &FlakyConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruption::FAILURE_BODY;
    use crate::http::X_REQUEST_ID;
    use axum::{
        body::Body,
        http::{HeaderMap, Request, StatusCode},
    };
    use std::time::Duration;
    use tower::ServiceExt;

    fn echo_request_id() -> Router {
        Router::new().fallback(|headers: HeaderMap| async move {
            headers
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        })
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn upstream_sees_request_id_but_response_does_not() {
        let server = HttpServer::with_upstream(FlakyConfig::default(), echo_request_id());
        let router = server.router();

        let (status, headers, body) =
            call(&router, Request::builder().uri("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.len(), 36, "uuid expected, got {body:?}");
        assert!(headers.get(X_REQUEST_ID).is_none());

        let request = Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, "client-chosen")
            .body(Body::empty())
            .unwrap();
        let (_, _, body) = call(&router, request).await;
        assert_eq!(body, "client-chosen");
    }

    #[tokio::test]
    async fn full_stack_injects_on_fiftieth_request() {
        let server = HttpServer::with_upstream(FlakyConfig::default(), echo_request_id());
        let router = server.router();

        for k in 1..=50u64 {
            let (status, _, body) =
                call(&router, Request::builder().uri("/v2/").body(Body::empty()).unwrap()).await;
            if k == 50 {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, FAILURE_BODY);
            } else {
                assert_eq!(status, StatusCode::OK);
            }
        }
        assert_eq!(server.chain().counter().current(), 50);
    }

    #[tokio::test]
    async fn slow_upstream_response_is_not_replaced() {
        let mut config = FlakyConfig::default();
        config.timeouts.request_secs = 1;
        let slow = Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            (StatusCode::CREATED, "stored")
        });
        let server = HttpServer::with_upstream(config, slow);

        let (status, _, body) = call(
            &server.router(),
            Request::builder().uri("/v2/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, "stored");
        assert_eq!(server.chain().counter().current(), 1);
    }

    #[tokio::test]
    async fn memory_upstream_by_default() {
        let server = HttpServer::new(FlakyConfig::default()).unwrap();
        let (status, headers, _) = call(
            &server.router(),
            Request::builder().uri("/v2/").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["docker-distribution-api-version"], "registry/2.0");
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = bind_listener("127.0.0.1:0").await.unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let err = bind_listener(&address).await.unwrap_err();
        assert!(matches!(err, ServeError::Bind { .. }));
        assert!(err.to_string().starts_with(&format!("failed to bind {address}")));
    }
}
