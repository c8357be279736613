//! Content addressing.
//!
//! The content id is a plain BLAKE3 digest of the file bytes. The checksum is
//! derived from the id alone (BLAKE3 key-derivation mode with its own
//! context) and only guards the metadata index against corruption; it says
//! nothing about whether the blob bytes are intact.

use crate::constants::{DIGEST_SIZE, KDF_CONTEXT_INDEX_CHECKSUM};
use crate::error::HashError;
use crate::types::ContentId;

pub fn hash(data: &[u8]) -> Result<ContentId, HashError> {
    if data.is_empty() {
        return Err(HashError::EmptyInput);
    }
    Ok(ContentId::from_digest(blake3::hash(data).as_bytes()))
}

pub fn checksum(id: &ContentId) -> String {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_INDEX_CHECKSUM);
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest.as_bytes()[..DIGEST_SIZE])
}

pub fn verify_checksum(id: &ContentId, expected: &str) -> bool {
    checksum(id) == expected
}

/// Whether `data` hashes to `id`. Used on bytes fetched from remote peers.
pub fn matches(id: &ContentId, data: &[u8]) -> bool {
    hash(data).map(|h| &h == id).unwrap_or(false)
}
