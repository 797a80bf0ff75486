//! Request handlers for the distribution API.

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE},
        HeaderMap, HeaderName, Method, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::upstream::registry::digest::validate_digest;
use crate::upstream::registry::error::RegistryError;
use crate::upstream::registry::routes::{parse_route, RegistryRoute};
use crate::upstream::registry::storage::{
    valid_repository_name, RegistryStore, DEFAULT_MANIFEST_TYPE,
};

pub const API_VERSION: HeaderName = HeaderName::from_static("docker-distribution-api-version");
pub const CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");
pub const UPLOAD_UUID: HeaderName = HeaderName::from_static("docker-upload-uuid");

/// Query parameters used across endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct RegistryParams {
    /// Digest committing an upload.
    pub digest: Option<String>,
    /// Cross-repository mount source digest.
    pub mount: Option<String>,
    /// Page size for listings.
    pub n: Option<usize>,
    /// Listing continues after this entry.
    pub last: Option<String>,
}

#[derive(Debug, Serialize)]
struct TagList {
    name: String,
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Catalog {
    repositories: Vec<String>,
}

/// Single entry point; the path decides the endpoint.
pub async fn dispatch(
    State(store): State<Arc<RegistryStore>>,
    method: Method,
    uri: Uri,
    query: Result<Query<RegistryParams>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // `n` is the only parameter that can fail to deserialize.
    let result = query
        .map_err(|rejection| RegistryError::PaginationNumberInvalid(rejection.body_text()))
        .and_then(|Query(params)| handle(&store, &method, uri.path(), &params, &headers, body));
    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(method = %method, path = %uri.path(), code = e.code(), "Registry error");
            e.into_response()
        }
    }
}

fn handle(
    store: &RegistryStore,
    method: &Method,
    path: &str,
    params: &RegistryParams,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, RegistryError> {
    let route = parse_route(path).ok_or(RegistryError::Unsupported)?;
    if let Some(name) = route.repository() {
        if !valid_repository_name(name) {
            return Err(RegistryError::NameInvalid);
        }
    }

    match route {
        RegistryRoute::Base => match *method {
            Method::GET | Method::HEAD => Ok((
                StatusCode::OK,
                [(API_VERSION, "registry/2.0")],
                Json(serde_json::json!({})),
            )
                .into_response()),
            _ => Err(RegistryError::MethodUnknown),
        },
        RegistryRoute::Catalog => match *method {
            Method::GET => {
                let repositories = paginate(store.repositories(), params);
                Ok(Json(Catalog { repositories }).into_response())
            }
            _ => Err(RegistryError::MethodUnknown),
        },
        RegistryRoute::Tags { name } => match *method {
            Method::GET => {
                let tags = paginate(store.tags(name)?, params);
                Ok(Json(TagList {
                    name: name.to_string(),
                    tags,
                })
                .into_response())
            }
            _ => Err(RegistryError::MethodUnknown),
        },
        RegistryRoute::Blob { name, digest } => blob(store, method, name, digest),
        RegistryRoute::UploadStart { name } => match *method {
            Method::POST => start_upload(store, name, params, body),
            _ => Err(RegistryError::MethodUnknown),
        },
        RegistryRoute::Upload { name, session } => {
            upload(store, method, name, session, params, headers, body)
        }
        RegistryRoute::Manifest { name, reference } => {
            manifest(store, method, name, reference, headers, body)
        }
    }
}

fn blob(
    store: &RegistryStore,
    method: &Method,
    _name: &str,
    digest: &str,
) -> Result<Response, RegistryError> {
    match *method {
        Method::GET | Method::HEAD => {
            let data = store.blob(digest).ok_or(RegistryError::BlobUnknown)?;
            let len = data.len();
            let body = if *method == Method::HEAD {
                Body::empty()
            } else {
                Body::from(data)
            };
            Ok((
                StatusCode::OK,
                [
                    (CONTENT_TYPE, "application/octet-stream".to_string()),
                    (CONTENT_LENGTH, len.to_string()),
                    (CONTENT_DIGEST, digest.to_string()),
                ],
                body,
            )
                .into_response())
        }
        Method::DELETE => {
            store.delete_blob(digest)?;
            Ok(StatusCode::ACCEPTED.into_response())
        }
        _ => Err(RegistryError::MethodUnknown),
    }
}

fn blob_created(name: &str, digest: &str) -> Response {
    (
        StatusCode::CREATED,
        [
            (LOCATION, format!("/v2/{name}/blobs/{digest}")),
            (CONTENT_DIGEST, digest.to_string()),
            (CONTENT_LENGTH, "0".to_string()),
        ],
    )
        .into_response()
}

fn upload_status(status: StatusCode, name: &str, session: &str, len: u64) -> Response {
    (
        status,
        [
            (LOCATION, format!("/v2/{name}/blobs/uploads/{session}")),
            (RANGE, format!("0-{}", len.saturating_sub(1))),
            (UPLOAD_UUID, session.to_string()),
            (CONTENT_LENGTH, "0".to_string()),
        ],
    )
        .into_response()
}

fn start_upload(
    store: &RegistryStore,
    name: &str,
    params: &RegistryParams,
    body: Bytes,
) -> Result<Response, RegistryError> {
    // Monolithic upload: the whole blob arrives with the POST.
    if let Some(digest) = params.digest.as_deref() {
        store.put_blob(digest, body)?;
        return Ok(blob_created(name, digest));
    }

    // Blobs are shared across repositories, so a mount succeeds whenever the
    // blob exists at all.
    if let Some(digest) = params.mount.as_deref() {
        if validate_digest(digest).is_ok() && store.has_blob(digest) {
            return Ok(blob_created(name, digest));
        }
    }

    let session = store.start_upload(name)?;
    tracing::debug!(repository = name, session = %session, "Upload started");
    Ok(upload_status(StatusCode::ACCEPTED, name, &session, 0))
}

fn upload(
    store: &RegistryStore,
    method: &Method,
    name: &str,
    session: &str,
    params: &RegistryParams,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, RegistryError> {
    match *method {
        Method::GET => {
            let len = store.upload_len(name, session)?;
            Ok(upload_status(StatusCode::NO_CONTENT, name, session, len))
        }
        Method::PATCH => {
            let start = content_range_start(headers)?;
            let len = store.append_upload(name, session, &body, start)?;
            Ok(upload_status(StatusCode::ACCEPTED, name, session, len))
        }
        Method::PUT => {
            let digest = params
                .digest
                .as_deref()
                .ok_or(RegistryError::DigestInvalid)?;
            store.finish_upload(name, session, &body, digest)?;
            tracing::debug!(repository = name, digest = digest, "Blob committed");
            Ok(blob_created(name, digest))
        }
        Method::DELETE => {
            store.cancel_upload(name, session)?;
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        _ => Err(RegistryError::MethodUnknown),
    }
}

/// Start offset of a `Content-Range: <start>-<end>` header, if present.
fn content_range_start(headers: &HeaderMap) -> Result<Option<u64>, RegistryError> {
    let Some(value) = headers.get(CONTENT_RANGE) else {
        return Ok(None);
    };
    let invalid = || RegistryError::BlobUploadInvalid("malformed Content-Range".to_string());
    let text = value.to_str().map_err(|_| invalid())?;
    let (start, _end) = text.split_once('-').ok_or_else(invalid)?;
    start.trim().parse().map(Some).map_err(|_| invalid())
}

fn manifest(
    store: &RegistryStore,
    method: &Method,
    name: &str,
    reference: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, RegistryError> {
    match *method {
        Method::GET | Method::HEAD => {
            let manifest = store.manifest(name, reference)?;
            let len = manifest.body.len();
            let body = if *method == Method::HEAD {
                Body::empty()
            } else {
                Body::from(manifest.body)
            };
            Ok((
                StatusCode::OK,
                [
                    (CONTENT_TYPE, manifest.media_type),
                    (CONTENT_LENGTH, len.to_string()),
                    (CONTENT_DIGEST, manifest.digest),
                ],
                body,
            )
                .into_response())
        }
        Method::PUT => {
            let media_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(DEFAULT_MANIFEST_TYPE);
            let digest = store.put_manifest(name, reference, media_type, body)?;
            tracing::debug!(repository = name, reference = reference, digest = %digest, "Manifest stored");
            Ok((
                StatusCode::CREATED,
                [
                    (LOCATION, format!("/v2/{name}/manifests/{digest}")),
                    (CONTENT_DIGEST, digest),
                    (CONTENT_LENGTH, "0".to_string()),
                ],
            )
                .into_response())
        }
        Method::DELETE => {
            store.delete_manifest(name, reference)?;
            Ok(StatusCode::ACCEPTED.into_response())
        }
        _ => Err(RegistryError::MethodUnknown),
    }
}

/// Apply `last` then `n` to a sorted listing.
fn paginate(entries: Vec<String>, params: &RegistryParams) -> Vec<String> {
    let start = match params.last.as_deref() {
        Some(last) => entries.partition_point(|entry| entry.as_str() <= last),
        None => 0,
    };
    let limit = params.n.unwrap_or(usize::MAX);
    entries.into_iter().skip(start).take(limit).collect()
}
