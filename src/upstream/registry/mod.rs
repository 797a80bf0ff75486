//! In-memory artifact registry.
//!
//! # Data Flow
//! ```text
//! Request
//!     → routes.rs (classify /v2/... path)
//!     → handlers.rs (endpoint logic, response headers)
//!     → storage.rs (blobs, uploads, manifests, tags)
//!     → error.rs (distribution API error envelope)
//! ```
//!
//! # Design Decisions
//! - Nothing is persisted; content lives for the process lifetime
//! - Blobs are shared by all repositories
//! - Only sha256 digests are accepted

pub mod digest;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod storage;

use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;

pub use error::RegistryError;
pub use storage::RegistryStore;

/// Router serving the registry API from `store`.
pub fn router(store: Arc<RegistryStore>, max_body_size: usize) -> Router {
    Router::new()
        .fallback(handlers::dispatch)
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::registry::digest::sha256_digest;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    const MANIFEST: &str = r#"{"schemaVersion":2,"layers":[]}"#;

    fn app() -> (Arc<RegistryStore>, Router) {
        let store = Arc::new(RegistryStore::new());
        (store.clone(), router(store, 1024 * 1024))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: &'static [u8]) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> bytes::Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn version_check() {
        let (_, app) = app();
        let response = send(&app, "GET", "/v2/", b"").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[handlers::API_VERSION.as_str()],
            "registry/2.0"
        );
    }

    #[tokio::test]
    async fn chunked_blob_push_and_pull() {
        let (_, app) = app();
        let digest = sha256_digest(b"hello world");

        let response = send(&app, "POST", "/v2/org/app/blobs/uploads/", b"").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let location = response.headers()["location"].to_str().unwrap().to_string();
        assert!(location.starts_with("/v2/org/app/blobs/uploads/"));

        let response = send(&app, "PATCH", &location, b"hello ").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers()["range"], "0-5");

        let response = send(&app, "PUT", &format!("{location}?digest={digest}"), b"world").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["docker-content-digest"], digest.as_str());

        let response = send(&app, "HEAD", &format!("/v2/org/app/blobs/{digest}"), b"").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-length"], "11");

        let response = send(&app, "GET", &format!("/v2/org/app/blobs/{digest}"), b"").await;
        assert_eq!(body_bytes(response).await, "hello world");
    }

    #[tokio::test]
    async fn monolithic_upload_with_bad_digest() {
        let (store, app) = app();
        let wrong = sha256_digest(b"something else");
        let response = send(&app, "POST", &format!("/v2/app/blobs/uploads/?digest={wrong}"), b"data").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!store.has_blob(&wrong));

        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value["errors"][0]["code"], "DIGEST_INVALID");
    }

    #[tokio::test]
    async fn mount_existing_blob() {
        let (store, app) = app();
        let digest = sha256_digest(b"shared");
        store.put_blob(&digest, bytes::Bytes::from_static(b"shared")).unwrap();

        let response = send(
            &app,
            "POST",
            &format!("/v2/other/blobs/uploads/?mount={digest}&from=app"),
            b"",
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn manifest_lifecycle() {
        let (_, app) = app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/v2/library/alpine/manifests/latest")
                    .header("content-type", "application/vnd.docker.distribution.manifest.v2+json")
                    .body(Body::from(MANIFEST))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let digest = response.headers()["docker-content-digest"].to_str().unwrap().to_string();
        assert_eq!(digest, sha256_digest(MANIFEST.as_bytes()));

        let response = send(&app, "GET", "/v2/library/alpine/manifests/latest", b"").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/vnd.docker.distribution.manifest.v2+json"
        );
        assert_eq!(body_bytes(response).await, MANIFEST);

        let response = send(&app, "GET", "/v2/library/alpine/tags/list", b"").await;
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value, serde_json::json!({"name": "library/alpine", "tags": ["latest"]}));

        let response = send(&app, "GET", "/v2/_catalog", b"").await;
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value, serde_json::json!({"repositories": ["library/alpine"]}));

        let response = send(&app, "DELETE", &format!("/v2/library/alpine/manifests/{digest}"), b"").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = send(&app, "GET", "/v2/library/alpine/manifests/latest", b"").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_things() {
        let (_, app) = app();

        let response = send(&app, "GET", "/healthz", b"").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, "GET", "/v2/Bad/tags/list", b"").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, "GET", "/v2/app/tags/list", b"").await;
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value["errors"][0]["code"], "NAME_UNKNOWN");

        let response = send(&app, "POST", "/v2/app/manifests/latest", b"").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_query_uses_error_envelope() {
        let (_, app) = app();

        let response = send(&app, "GET", "/v2/_catalog?n=abc", b"").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value["errors"][0]["code"], "PAGINATION_NUMBER_INVALID");
    }

    #[tokio::test]
    async fn upload_session_limit() {
        let store = Arc::new(RegistryStore::with_upload_limits(
            1,
            storage::DEFAULT_UPLOAD_TTL,
        ));
        let app = router(store, 1024);

        let response = send(&app, "POST", "/v2/app/blobs/uploads/", b"").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = send(&app, "POST", "/v2/app/blobs/uploads/", b"").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value["errors"][0]["code"], "TOOMANYREQUESTS");
    }
}
