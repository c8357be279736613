//! Domain model shared by the store and the engine.
//!
//! Every struct derives `Serialize` and `Deserialize`: metadata records are
//! persisted as JSON in both durable tiers and handed to the network
//! collaborator as-is.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::BYTES_PER_GB;
use crate::hashing;
use crate::types::{ContentId, PeerId};

// ---------------------------------------------------------------------------
// FileMetadata
// ---------------------------------------------------------------------------

/// Everything the engine believes about one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMetadata {
    /// Record identifier, generated at ingest.
    pub id: Uuid,
    /// BLAKE3 digest of the plaintext; primary key of the index.
    pub content_id: ContentId,
    /// Digest over `content_id`, see [`hashing::checksum`].
    pub checksum: String,
    pub name: String,
    pub mime_type: String,
    /// Plaintext length in bytes, also for encrypted records.
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Advertised for network-wide discovery.
    pub indexed: bool,
    pub is_encrypted: bool,
    /// Passphrase fingerprint when `is_encrypted`.
    pub encryption_key_id: Option<String>,
    pub owner_peer_id: PeerId,
    /// Peers believed to hold a copy. Advisory only.
    pub replicated_on: BTreeSet<PeerId>,
    pub is_valid: bool,
    pub retry_count: u32,
}

impl FileMetadata {
    /// Build a fresh record for content just ingested by `owner`.
    ///
    /// `replicated_on` starts empty; the replication ledger registers the
    /// local peer once the blob has been written.
    pub fn new(
        content_id: ContentId,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        owner: PeerId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            checksum: hashing::checksum(&content_id),
            content_id,
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            uploaded_at: now,
            last_modified: now,
            indexed: false,
            is_encrypted: false,
            encryption_key_id: None,
            owner_peer_id: owner,
            replicated_on: BTreeSet::new(),
            is_valid: true,
            retry_count: 0,
        }
    }

    pub fn has_valid_checksum(&self) -> bool {
        hashing::verify_checksum(&self.content_id, &self.checksum)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// StorageQuota
// ---------------------------------------------------------------------------

/// Capacity accounting, always derived from a full index snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageQuota {
    pub total_capacity_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub monthly_cost: f64,
}

impl StorageQuota {
    pub fn bytes_to_gb(bytes: u64) -> f64 {
        bytes as f64 / BYTES_PER_GB
    }

    /// Whether `additional_bytes` more would still fit.
    pub fn fits(&self, additional_bytes: u64) -> bool {
        Self::bytes_to_gb(additional_bytes) <= self.available_gb
    }
}

// ---------------------------------------------------------------------------
// PeerInfo
// ---------------------------------------------------------------------------

/// A remote peer as seen through heartbeats and the collaborator's peer list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub last_seen: DateTime<Utc>,
    pub files_count: u64,
    pub storage_used: u64,
    pub is_connected: bool,
}

impl PeerInfo {
    pub fn new(peer_id: PeerId, seen_at: DateTime<Utc>) -> Self {
        Self {
            peer_id,
            last_seen: seen_at,
            files_count: 0,
            storage_used: 0,
            is_connected: true,
        }
    }
}
