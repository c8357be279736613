use cairn_shared::{ContentId, CryptoError, HashError, PeerId};
use cairn_store::StoreError;
use thiserror::Error;

/// Errors surfaced to callers of the storage engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Empty or malformed input, rejected before hashing.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Hashing failed: {0}")]
    Hash(#[from] HashError),

    /// Only the volatile cache write can make an ingest fail; durable tier
    /// failures are absorbed by the store.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Not in the index, or in no tier and no reachable replica.
    #[error("Content not found: {0}")]
    NotFound(ContentId),

    #[error("Decryption failed for {content_id}: {source}")]
    Decryption {
        content_id: ContentId,
        #[source]
        source: CryptoError,
    },

    #[error("Encryption failed: {0}")]
    Encryption(#[source] CryptoError),

    #[error("Content {0} is encrypted; a passphrase is required")]
    PassphraseRequired(ContentId),

    #[error("Quota exceeded: need {needed_gb:.6} GB, {available_gb:.6} GB available")]
    QuotaExceeded { needed_gb: f64, available_gb: f64 },
}

/// Failures reported by the network collaborator. Never propagated out of
/// replication paths; only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Peer {0} unreachable")]
    Unreachable(PeerId),

    #[error("Peer {0} timed out")]
    Timeout(PeerId),

    #[error("Peer {peer} rejected the request: {reason}")]
    Rejected { peer: PeerId, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
