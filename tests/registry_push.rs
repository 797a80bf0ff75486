//! Pushing and pulling through the in-memory registry while failures are
//! being injected.

use axum::http::StatusCode;
use flaky_registry::config::FlakyConfig;
use flaky_registry::upstream::registry::digest::sha256_digest;
use flaky_registry::HttpServer;

mod common;

/// Send until the response is not an injected failure.
async fn with_retry<F>(make: F, retries: &mut u32) -> reqwest::Response
where
    F: Fn() -> reqwest::RequestBuilder,
{
    loop {
        let res = make().send().await.expect("Server unreachable");
        if res.status() != StatusCode::INTERNAL_SERVER_ERROR {
            return res;
        }
        *retries += 1;
    }
}

#[tokio::test]
async fn test_push_and_pull_survive_injected_failures() {
    let server = HttpServer::new(FlakyConfig::default()).unwrap();
    // Put the next injection in the middle of the upload.
    for _ in 0..48 {
        server.chain().counter().advance();
    }
    let (addr, shutdown) = common::spawn_server(server).await;

    let client = common::client();
    let base = format!("http://{}", addr);
    let mut retries = 0;

    let res = with_retry(|| client.get(format!("{base}/v2/")), &mut retries).await;
    assert_eq!(res.status(), StatusCode::OK);

    // Request 50 is the upload start; the retry opens the session.
    let res = with_retry(
        || client.post(format!("{base}/v2/demo/app/blobs/uploads/")),
        &mut retries,
    )
    .await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(retries, 1);
    let location = res.headers()["location"].to_str().unwrap().to_string();

    let layer = b"layer-bytes".to_vec();
    let layer_digest = sha256_digest(&layer);
    let res = with_retry(
        || client.patch(format!("{base}{location}")).body(layer.clone()),
        &mut retries,
    )
    .await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let res = with_retry(
        || client.put(format!("{base}{location}?digest={layer_digest}")),
        &mut retries,
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let manifest = format!(
        r#"{{"schemaVersion":2,"layers":[{{"digest":"{layer_digest}","size":{}}}]}}"#,
        layer.len()
    );
    let res = with_retry(
        || {
            client
                .put(format!("{base}/v2/demo/app/manifests/v1"))
                .header("content-type", "application/vnd.oci.image.manifest.v1+json")
                .body(manifest.clone())
        },
        &mut retries,
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(
        res.headers()["docker-content-digest"],
        sha256_digest(manifest.as_bytes()).as_str()
    );

    let res = with_retry(
        || client.get(format!("{base}/v2/demo/app/manifests/v1")),
        &mut retries,
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), manifest);

    let res = with_retry(
        || client.get(format!("{base}/v2/demo/app/blobs/{layer_digest}")),
        &mut retries,
    )
    .await;
    assert_eq!(res.bytes().await.unwrap().as_ref(), layer.as_slice());

    let res = with_retry(
        || client.get(format!("{base}/v2/demo/app/tags/list")),
        &mut retries,
    )
    .await;
    let tags: serde_json::Value = res.json().await.unwrap();
    assert_eq!(tags, serde_json::json!({"name": "demo/app", "tags": ["v1"]}));

    assert_eq!(retries, 1);
    shutdown.trigger();
}
