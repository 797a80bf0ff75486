//! Content digests.

use sha2::{Digest, Sha256};

use crate::upstream::registry::error::RegistryError;

pub const SHA256_PREFIX: &str = "sha256:";

/// `sha256:<hex>` digest of `data`.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("{SHA256_PREFIX}{:x}", Sha256::digest(data))
}

/// A manifest reference is a digest when it carries an algorithm prefix.
pub fn is_digest(reference: &str) -> bool {
    reference.contains(':')
}

/// Only sha256 digests with 64 lowercase hex characters are accepted.
pub fn validate_digest(digest: &str) -> Result<(), RegistryError> {
    let hex = digest
        .strip_prefix(SHA256_PREFIX)
        .ok_or(RegistryError::DigestInvalid)?;
    let well_formed = hex.len() == 64
        && hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if well_formed {
        Ok(())
    } else {
        Err(RegistryError::DigestInvalid)
    }
}
