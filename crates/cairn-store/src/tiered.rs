//! The tiered persistence manager.
//!
//! Reads fall through cache -> transactional -> flat, first hit wins, and a
//! hit below the cache is copied back into it. Writes must land in the cache;
//! the two durable tiers are written concurrently and their failures only
//! shrink the returned [`TierSet`].
//!
//! This layer has no opinion about which content *exists*; that is the
//! metadata index's job. It only stores bytes and the serialized records it
//! is handed.

use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;
use cairn_shared::{ContentId, FileMetadata};
use tracing::{debug, warn};

use crate::cache::MemoryCache;
use crate::database::DB_FILE_NAME;
use crate::error::Result;
use crate::flat::FlatStore;
use crate::transactional::TransactionalTier;

/// Directory (under the data root) holding the flat tier.
pub const FLAT_DIR_NAME: &str = "flat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Cache,
    Transactional,
    Flat,
}

impl Tier {
    /// Read order.
    pub const ALL: [Tier; 3] = [Tier::Cache, Tier::Transactional, Tier::Flat];

    pub fn is_durable(self) -> bool {
        !matches!(self, Tier::Cache)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Tier::Cache => "cache",
            Tier::Transactional => "transactional",
            Tier::Flat => "flat",
        };
        f.write_str(name)
    }
}

/// Bytes read from a tier, tagged with where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierBlob {
    Cached(Bytes),
    Stored(Bytes),
    Flat(Bytes),
}

impl TierBlob {
    pub fn tier(&self) -> Tier {
        match self {
            TierBlob::Cached(_) => Tier::Cache,
            TierBlob::Stored(_) => Tier::Transactional,
            TierBlob::Flat(_) => Tier::Flat,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        match self {
            TierBlob::Cached(b) | TierBlob::Stored(b) | TierBlob::Flat(b) => b,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            TierBlob::Cached(b) | TierBlob::Stored(b) | TierBlob::Flat(b) => b,
        }
    }
}

/// The set of tiers a write reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierSet {
    pub cache: bool,
    pub transactional: bool,
    pub flat: bool,
}

impl TierSet {
    pub fn insert(&mut self, tier: Tier) {
        match tier {
            Tier::Cache => self.cache = true,
            Tier::Transactional => self.transactional = true,
            Tier::Flat => self.flat = true,
        }
    }

    pub fn contains(&self, tier: Tier) -> bool {
        match tier {
            Tier::Cache => self.cache,
            Tier::Transactional => self.transactional,
            Tier::Flat => self.flat,
        }
    }

    /// At least one tier that survives a restart.
    pub fn is_durable(&self) -> bool {
        self.transactional || self.flat
    }

    pub fn is_empty(&self) -> bool {
        !(self.cache || self.transactional || self.flat)
    }

    pub fn tiers(&self) -> Vec<Tier> {
        Tier::ALL.into_iter().filter(|t| self.contains(*t)).collect()
    }
}

/// Sizing and placement of the three tiers.
#[derive(Debug, Clone)]
pub struct TierConfig {
    /// Data directory; the database and the flat tier live below it.
    pub root: PathBuf,
    pub cache_max_bytes: usize,
    pub flat_max_blob: usize,
}

pub struct TieredStore {
    cache: MemoryCache,
    transactional: TransactionalTier,
    flat: FlatStore,
}

impl TieredStore {
    pub async fn open(config: &TierConfig) -> Result<Self> {
        let transactional = TransactionalTier::open(&config.root.join(DB_FILE_NAME))?;
        let flat = FlatStore::new(config.root.join(FLAT_DIR_NAME), config.flat_max_blob).await?;
        Ok(Self::from_parts(
            MemoryCache::new(config.cache_max_bytes),
            transactional,
            flat,
        ))
    }

    pub fn from_parts(cache: MemoryCache, transactional: TransactionalTier, flat: FlatStore) -> Self {
        Self {
            cache,
            transactional,
            flat,
        }
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }

    pub fn transactional(&self) -> &TransactionalTier {
        &self.transactional
    }

    pub fn flat(&self) -> &FlatStore {
        &self.flat
    }

    // ------------------------------------------------------------------
    // Blobs
    // ------------------------------------------------------------------

    /// Write `data` to every tier. Fails only if the cache refuses it.
    pub async fn put(&self, id: &ContentId, data: Bytes) -> Result<TierSet> {
        self.cache.put(id, data.clone())?;

        let mut written = TierSet::default();
        written.insert(Tier::Cache);

        let (stored, flat) = tokio::join!(
            self.transactional.put(id, data.to_vec()),
            self.flat.put(id, &data),
        );

        match stored {
            Ok(()) => written.insert(Tier::Transactional),
            Err(e) => warn!(content_id = %id, tier = %Tier::Transactional, error = %e, "tier write failed"),
        }
        match flat {
            Ok(()) => written.insert(Tier::Flat),
            Err(e) => warn!(content_id = %id, tier = %Tier::Flat, error = %e, "tier write failed"),
        }

        if !written.is_durable() {
            warn!(content_id = %id, "blob only held in volatile cache");
        }
        debug!(content_id = %id, size = data.len(), tiers = ?written.tiers(), "blob written");
        Ok(written)
    }

    pub async fn get(&self, id: &ContentId) -> Option<TierBlob> {
        if let Some(data) = self.cache.get(id) {
            return Some(TierBlob::Cached(data));
        }

        let found = match self.transactional.get(id).await {
            Ok(Some(data)) => Some(TierBlob::Stored(Bytes::from(data))),
            Ok(None) => None,
            Err(e) => {
                warn!(content_id = %id, tier = %Tier::Transactional, error = %e, "tier read failed");
                None
            }
        };

        let found = match found {
            Some(blob) => Some(blob),
            None => match self.flat.get(id).await {
                Ok(Some(data)) => Some(TierBlob::Flat(Bytes::from(data))),
                Ok(None) => None,
                Err(e) => {
                    warn!(content_id = %id, tier = %Tier::Flat, error = %e, "tier read failed");
                    None
                }
            },
        };

        if let Some(blob) = &found {
            if let Err(e) = self.cache.put(id, blob.bytes().clone()) {
                debug!(content_id = %id, error = %e, "cache backfill skipped");
            }
        }
        found
    }

    /// Whether `tier` currently holds `id`. Read errors count as absent.
    pub async fn contains(&self, tier: Tier, id: &ContentId) -> bool {
        let probe = match tier {
            Tier::Cache => return self.cache.contains(id),
            Tier::Transactional => self.transactional.contains(id).await,
            Tier::Flat => self.flat.contains(id).await,
        };
        probe.unwrap_or_else(|e| {
            warn!(content_id = %id, %tier, error = %e, "tier probe failed");
            false
        })
    }

    pub async fn locate(&self, id: &ContentId) -> TierSet {
        let mut set = TierSet::default();
        for tier in Tier::ALL {
            if self.contains(tier, id).await {
                set.insert(tier);
            }
        }
        set
    }

    /// Remove `id` from every tier. Absence is not an error.
    pub async fn delete(&self, id: &ContentId) {
        self.cache.remove(id);

        let (stored, flat) = tokio::join!(self.transactional.delete(id), self.flat.delete(id));
        if let Err(e) = stored {
            warn!(content_id = %id, tier = %Tier::Transactional, error = %e, "tier delete failed");
        }
        if let Err(e) = flat {
            warn!(content_id = %id, tier = %Tier::Flat, error = %e, "tier delete failed");
        }
    }

    // ------------------------------------------------------------------
    // Metadata records
    // ------------------------------------------------------------------

    /// Persist `meta` to both durable tiers. Returns the tiers that took it.
    pub async fn save_metadata(&self, meta: &FileMetadata) -> TierSet {
        let mut written = TierSet::default();
        let (stored, flat) = tokio::join!(
            self.transactional.put_metadata(meta),
            self.flat.put_metadata(meta),
        );
        match stored {
            Ok(()) => written.insert(Tier::Transactional),
            Err(e) => warn!(content_id = %meta.content_id, tier = %Tier::Transactional, error = %e, "metadata write failed"),
        }
        match flat {
            Ok(()) => written.insert(Tier::Flat),
            Err(e) => warn!(content_id = %meta.content_id, tier = %Tier::Flat, error = %e, "metadata write failed"),
        }
        written
    }

    /// Union of the records held by both durable tiers; on conflict the one
    /// with the newer `last_modified` wins. Errors only if neither tier could
    /// be read.
    pub async fn load_metadata(&self) -> Result<Vec<FileMetadata>> {
        let (stored, flat) = tokio::join!(self.transactional.list_metadata(), self.flat.list_metadata());

        let (stored, flat) = match (stored, flat) {
            (Err(e), Err(flat_err)) => {
                warn!(tier = %Tier::Flat, error = %flat_err, "metadata load failed");
                return Err(e);
            }
            (stored, flat) => (
                stored.unwrap_or_else(|e| {
                    warn!(tier = %Tier::Transactional, error = %e, "metadata load failed");
                    Vec::new()
                }),
                flat.unwrap_or_else(|e| {
                    warn!(tier = %Tier::Flat, error = %e, "metadata load failed");
                    Vec::new()
                }),
            ),
        };

        let mut merged: HashMap<ContentId, FileMetadata> = HashMap::new();
        for meta in stored.into_iter().chain(flat) {
            match merged.get(&meta.content_id) {
                Some(existing) if existing.last_modified >= meta.last_modified => {}
                _ => {
                    merged.insert(meta.content_id.clone(), meta);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    pub async fn delete_metadata(&self, id: &ContentId) {
        let (stored, flat) = tokio::join!(
            self.transactional.delete_metadata(id),
            self.flat.delete_metadata(id),
        );
        if let Err(e) = stored {
            warn!(content_id = %id, tier = %Tier::Transactional, error = %e, "metadata delete failed");
        }
        if let Err(e) = flat {
            warn!(content_id = %id, tier = %Tier::Flat, error = %e, "metadata delete failed");
        }
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub async fn save_setting(&self, key: &str, value: &str) -> TierSet {
        let mut written = TierSet::default();
        let (stored, flat) = tokio::join!(
            self.transactional.set_setting(key, value),
            self.flat.set_setting(key, value),
        );
        match stored {
            Ok(()) => written.insert(Tier::Transactional),
            Err(e) => warn!(key, tier = %Tier::Transactional, error = %e, "setting write failed"),
        }
        match flat {
            Ok(()) => written.insert(Tier::Flat),
            Err(e) => warn!(key, tier = %Tier::Flat, error = %e, "setting write failed"),
        }
        written
    }

    pub async fn load_setting(&self, key: &str) -> Option<String> {
        match self.transactional.get_setting(key).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => warn!(key, tier = %Tier::Transactional, error = %e, "setting read failed"),
        }
        match self.flat.get_setting(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, tier = %Tier::Flat, error = %e, "setting read failed");
                None
            }
        }
    }
}
