//! Registry API errors.
//!
//! Rendered as the distribution API error envelope:
//! `{"errors":[{"code":"...","message":"..."}]}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("blob unknown to registry")]
    BlobUnknown,

    #[error("blob upload unknown to registry")]
    BlobUploadUnknown,

    #[error("blob upload invalid: {0}")]
    BlobUploadInvalid(String),

    #[error("provided digest did not match uploaded content")]
    DigestInvalid,

    #[error("manifest unknown")]
    ManifestUnknown,

    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("repository name not known to registry")]
    NameUnknown,

    #[error("invalid repository name")]
    NameInvalid,

    #[error("manifest tag did not match URI")]
    TagInvalid,

    #[error("method not supported for this endpoint")]
    MethodUnknown,

    #[error("the operation is unsupported")]
    Unsupported,

    #[error("too many open upload sessions")]
    TooManyUploads,

    #[error("invalid pagination number: {0}")]
    PaginationNumberInvalid(String),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::BlobUnknown => "BLOB_UNKNOWN",
            RegistryError::BlobUploadUnknown => "BLOB_UPLOAD_UNKNOWN",
            RegistryError::BlobUploadInvalid(_) => "BLOB_UPLOAD_INVALID",
            RegistryError::DigestInvalid => "DIGEST_INVALID",
            RegistryError::ManifestUnknown => "MANIFEST_UNKNOWN",
            RegistryError::ManifestInvalid(_) => "MANIFEST_INVALID",
            RegistryError::NameUnknown => "NAME_UNKNOWN",
            RegistryError::NameInvalid => "NAME_INVALID",
            RegistryError::TagInvalid => "TAG_INVALID",
            RegistryError::MethodUnknown => "METHOD_UNKNOWN",
            RegistryError::Unsupported => "UNSUPPORTED",
            RegistryError::TooManyUploads => "TOOMANYREQUESTS",
            RegistryError::PaginationNumberInvalid(_) => "PAGINATION_NUMBER_INVALID",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RegistryError::BlobUnknown
            | RegistryError::BlobUploadUnknown
            | RegistryError::ManifestUnknown
            | RegistryError::NameUnknown
            | RegistryError::Unsupported => StatusCode::NOT_FOUND,
            RegistryError::BlobUploadInvalid(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            RegistryError::DigestInvalid
            | RegistryError::ManifestInvalid(_)
            | RegistryError::NameInvalid
            | RegistryError::TagInvalid
            | RegistryError::PaginationNumberInvalid(_) => StatusCode::BAD_REQUEST,
            RegistryError::MethodUnknown => StatusCode::METHOD_NOT_ALLOWED,
            RegistryError::TooManyUploads => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "errors": [{
                "code": self.code(),
                "message": self.to_string(),
            }]
        });
        (self.status(), Json(body)).into_response()
    }
}
