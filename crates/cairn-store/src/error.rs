use thiserror::Error;

/// Errors produced by a single storage tier.
///
/// The tiered manager absorbs these for the durable tiers and only lets a
/// cache failure escape from `put`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error in the flat tier or while creating directories.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted metadata record could not be (de)serialized.
    #[error("Metadata encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The blob alone is larger than the cache budget.
    #[error("Cache full: blob of {size} bytes exceeds the {budget} byte budget")]
    CacheFull { size: usize, budget: usize },

    /// The flat tier refuses blobs above its ceiling.
    #[error("Blob too large: {size} bytes (max {max})")]
    BlobTooLarge { size: usize, max: usize },

    #[error("Empty blob")]
    EmptyBlob,

    /// Invalid settings key (path separators, traversal).
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
