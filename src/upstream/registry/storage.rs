//! In-memory content store.
//!
//! Blobs are content-addressed and shared by all repositories. Manifests and
//! tags are kept per repository. Upload sessions accumulate chunks until the
//! client commits them with a digest. Sessions left idle past the upload TTL
//! are discarded, and no more than `max_uploads` are open at once.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::upstream::registry::digest::{is_digest, sha256_digest, validate_digest};
use crate::upstream::registry::error::RegistryError;

/// Manifest media type assumed when a client sends none.
pub const DEFAULT_MANIFEST_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

pub const DEFAULT_MAX_UPLOADS: usize = 256;
pub const DEFAULT_UPLOAD_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredManifest {
    pub digest: String,
    pub media_type: String,
    pub body: Bytes,
}

#[derive(Debug, Default)]
struct Repository {
    manifests: HashMap<String, StoredManifest>,
    /// tag -> manifest digest
    tags: BTreeMap<String, String>,
}

#[derive(Debug)]
struct UploadSession {
    repository: String,
    data: Vec<u8>,
    last_active: Instant,
}

impl UploadSession {
    fn expired(&self, ttl: Duration) -> bool {
        self.last_active.elapsed() >= ttl
    }
}

/// Thread-safe registry storage.
#[derive(Debug)]
pub struct RegistryStore {
    blobs: DashMap<String, Bytes>,
    repositories: DashMap<String, Repository>,
    uploads: DashMap<String, UploadSession>,
    max_uploads: usize,
    upload_ttl: Duration,
}

impl Default for RegistryStore {
    fn default() -> Self {
        Self::with_upload_limits(DEFAULT_MAX_UPLOADS, DEFAULT_UPLOAD_TTL)
    }
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upload_limits(max_uploads: usize, upload_ttl: Duration) -> Self {
        Self {
            blobs: DashMap::new(),
            repositories: DashMap::new(),
            uploads: DashMap::new(),
            max_uploads,
            upload_ttl,
        }
    }

    pub fn blob(&self, digest: &str) -> Option<Bytes> {
        self.blobs.get(digest).map(|b| b.value().clone())
    }

    pub fn has_blob(&self, digest: &str) -> bool {
        self.blobs.contains_key(digest)
    }

    /// Store `data` under `expected`, rejecting it if the content disagrees.
    pub fn put_blob(&self, expected: &str, data: Bytes) -> Result<(), RegistryError> {
        validate_digest(expected)?;
        if sha256_digest(&data) != expected {
            return Err(RegistryError::DigestInvalid);
        }
        self.blobs.insert(expected.to_string(), data);
        Ok(())
    }

    pub fn delete_blob(&self, digest: &str) -> Result<(), RegistryError> {
        self.blobs
            .remove(digest)
            .map(|_| ())
            .ok_or(RegistryError::BlobUnknown)
    }

    /// Open an upload session and return its id.
    ///
    /// Expired sessions are swept first; if the cap is still reached the
    /// client is asked to back off.
    pub fn start_upload(&self, repository: &str) -> Result<String, RegistryError> {
        self.purge_expired_uploads();
        if self.uploads.len() >= self.max_uploads {
            tracing::warn!(
                open = self.uploads.len(),
                max = self.max_uploads,
                "Upload session limit reached"
            );
            return Err(RegistryError::TooManyUploads);
        }

        let id = Uuid::new_v4().to_string();
        self.uploads.insert(
            id.clone(),
            UploadSession {
                repository: repository.to_string(),
                data: Vec::new(),
                last_active: Instant::now(),
            },
        );
        Ok(id)
    }

    /// Drop every idle session past the TTL, returning how many went.
    pub fn purge_expired_uploads(&self) -> usize {
        let before = self.uploads.len();
        self.uploads
            .retain(|_, session| !session.expired(self.upload_ttl));
        let purged = before.saturating_sub(self.uploads.len());
        if purged > 0 {
            tracing::debug!(purged, "Discarded idle upload sessions");
        }
        purged
    }

    pub fn open_uploads(&self) -> usize {
        self.uploads.len()
    }

    fn expire_upload(&self, id: &str) {
        self.uploads
            .remove_if(id, |_, session| session.expired(self.upload_ttl));
    }

    /// Bytes received so far for an upload.
    pub fn upload_len(&self, repository: &str, id: &str) -> Result<u64, RegistryError> {
        self.expire_upload(id);
        match self.uploads.get(id) {
            Some(session) if session.repository == repository => Ok(session.data.len() as u64),
            _ => Err(RegistryError::BlobUploadUnknown),
        }
    }

    /// Append a chunk. When `start` is given it must equal the current length.
    pub fn append_upload(
        &self,
        repository: &str,
        id: &str,
        chunk: &[u8],
        start: Option<u64>,
    ) -> Result<u64, RegistryError> {
        self.expire_upload(id);
        let mut session = match self.uploads.get_mut(id) {
            Some(session) if session.repository == repository => session,
            _ => return Err(RegistryError::BlobUploadUnknown),
        };

        let current = session.data.len() as u64;
        if let Some(start) = start {
            if start != current {
                return Err(RegistryError::BlobUploadInvalid(format!(
                    "chunk starts at {start}, upload has {current} bytes"
                )));
            }
        }

        session.data.extend_from_slice(chunk);
        session.last_active = Instant::now();
        Ok(session.data.len() as u64)
    }

    /// Commit an upload with a final (possibly empty) chunk.
    ///
    /// The session is closed whether or not the digest matches.
    pub fn finish_upload(
        &self,
        repository: &str,
        id: &str,
        chunk: &[u8],
        digest: &str,
    ) -> Result<(), RegistryError> {
        validate_digest(digest)?;
        self.expire_upload(id);
        let mut session = match self.uploads.remove(id) {
            Some((_, session)) if session.repository == repository => session,
            Some((id, session)) => {
                self.uploads.insert(id, session);
                return Err(RegistryError::BlobUploadUnknown);
            }
            None => return Err(RegistryError::BlobUploadUnknown),
        };
        session.data.extend_from_slice(chunk);
        self.put_blob(digest, Bytes::from(session.data))
    }

    pub fn cancel_upload(&self, repository: &str, id: &str) -> Result<(), RegistryError> {
        self.expire_upload(id);
        self.uploads
            .remove_if(id, |_, session| session.repository == repository)
            .map(|_| ())
            .ok_or(RegistryError::BlobUploadUnknown)
    }

    /// Look up a manifest by tag or digest.
    pub fn manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<StoredManifest, RegistryError> {
        let repo = self
            .repositories
            .get(repository)
            .ok_or(RegistryError::NameUnknown)?;

        let digest = if is_digest(reference) {
            reference
        } else {
            repo.tags
                .get(reference)
                .map(String::as_str)
                .ok_or(RegistryError::ManifestUnknown)?
        };

        repo.manifests
            .get(digest)
            .cloned()
            .ok_or(RegistryError::ManifestUnknown)
    }

    /// Store a manifest and return its digest. A tag reference is pointed at it.
    pub fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        body: Bytes,
    ) -> Result<String, RegistryError> {
        serde_json::from_slice::<serde_json::Value>(&body)
            .map_err(|e| RegistryError::ManifestInvalid(e.to_string()))?;

        let digest = sha256_digest(&body);
        if is_digest(reference) {
            if reference != digest {
                return Err(RegistryError::DigestInvalid);
            }
        } else if !valid_tag(reference) {
            return Err(RegistryError::TagInvalid);
        }

        let mut repo = self.repositories.entry(repository.to_string()).or_default();
        repo.manifests.insert(
            digest.clone(),
            StoredManifest {
                digest: digest.clone(),
                media_type: media_type.to_string(),
                body,
            },
        );
        if !is_digest(reference) {
            repo.tags.insert(reference.to_string(), digest.clone());
        }
        Ok(digest)
    }

    /// Delete by digest (removing tags that point at it) or by tag.
    pub fn delete_manifest(&self, repository: &str, reference: &str) -> Result<(), RegistryError> {
        let mut repo = self
            .repositories
            .get_mut(repository)
            .ok_or(RegistryError::NameUnknown)?;

        if is_digest(reference) {
            repo.manifests
                .remove(reference)
                .ok_or(RegistryError::ManifestUnknown)?;
            repo.tags.retain(|_, digest| *digest != reference);
        } else {
            repo.tags
                .remove(reference)
                .ok_or(RegistryError::ManifestUnknown)?;
        }
        Ok(())
    }

    /// Sorted tags of a repository.
    pub fn tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        self.repositories
            .get(repository)
            .map(|repo| repo.tags.keys().cloned().collect())
            .ok_or(RegistryError::NameUnknown)
    }

    /// Sorted names of repositories holding at least one manifest.
    pub fn repositories(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .repositories
            .iter()
            .filter(|entry| !entry.manifests.is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

/// `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`
fn valid_tag(tag: &str) -> bool {
    let mut bytes = tag.bytes();
    let first_ok = matches!(bytes.next(), Some(b) if b.is_ascii_alphanumeric() || b == b'_');
    first_ok
        && tag.len() <= 128
        && bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

/// Repository names: lowercase alphanumeric components joined by `/`, with
/// single `.`, `_` or `-` separators inside a component.
pub fn valid_repository_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && name.split('/').all(|component| {
            let bytes = component.as_bytes();
            !bytes.is_empty()
                && bytes.first().is_some_and(|b| is_name_char(*b))
                && bytes.last().is_some_and(|b| is_name_char(*b))
                && bytes.iter().all(|b| is_name_char(*b) || matches!(*b, b'.' | b'_' | b'-'))
        })
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}
