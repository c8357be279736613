//! The storage engine facade.
//!
//! Owns the metadata index, the tiered store and the replication ledger, and
//! is the only place that sequences them: ingest goes hash -> index ->
//! tiers -> ledger -> quota, retrieval goes index -> tiers -> replicas ->
//! envelope. Every mutating operation takes `&mut self`, so a single engine
//! never has two of them in flight.

use std::sync::Arc;

use bytes::Bytes;
use cairn_shared::{crypto, hashing, ContentId, CryptoError, FileMetadata, PeerId, PeerInfo, StorageQuota};
use cairn_store::{Tier, TierSet, TieredStore};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::index::MetadataIndex;
use crate::ledger::ReplicationLedger;
use crate::network::Network;
use crate::peers::{lock_directory, spawn_heartbeat_monitor, HeartbeatMonitor, PeerDirectory, SharedPeerDirectory};
use crate::quota;
use crate::recovery::{self, SweepReport};

/// Settings key for the user-set capacity.
pub const CAPACITY_KEY: &str = "capacity_gb";
/// Settings key for this peer's identity.
pub const LOCAL_PEER_KEY: &str = "local_peer_id";

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// A file handed to [`StorageEngine::add_file`].
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
    /// Advertise for network-wide discovery.
    pub indexed: bool,
    /// Wrap the bytes before they reach any tier.
    pub passphrase: Option<String>,
    /// Uploading peer. Defaults to the local peer.
    pub peer_id: Option<PeerId>,
}

impl IngestRequest {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            data: data.into(),
            indexed: false,
            passphrase: None,
            peer_id: None,
        }
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn from_peer(mut self, peer: PeerId) -> Self {
        self.peer_id = Some(peer);
        self
    }
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub metadata: FileMetadata,
    /// Tiers holding the blob after the ingest.
    pub tiers: TierSet,
    /// The content was already in the index.
    pub deduplicated: bool,
    /// A passphrase was supplied for content already stored in plaintext.
    /// The stored record stays unencrypted.
    pub passphrase_ignored: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub records: usize,
    pub valid: usize,
    pub invalid: usize,
    pub encrypted: usize,
    pub indexed: usize,
    pub cached_blobs: usize,
    pub cache_bytes: usize,
    pub cache_budget: usize,
    pub known_peers: usize,
    pub connected_peers: usize,
}

// ---------------------------------------------------------------------------
// StorageEngine
// ---------------------------------------------------------------------------

pub struct StorageEngine {
    config: EngineConfig,
    local_peer: PeerId,
    tiers: TieredStore,
    index: MetadataIndex,
    ledger: ReplicationLedger,
    peers: SharedPeerDirectory,
    capacity_gb: f64,
    quota: StorageQuota,
}

impl StorageEngine {
    /// Open the tiers under `config.data_dir`, reload the index from the
    /// durable tiers and run one recovery sweep.
    pub async fn open(config: EngineConfig, network: Arc<dyn Network>) -> Result<Self> {
        let tiers = TieredStore::open(&config.tier_config()).await?;

        let local_peer = resolve_local_peer(&config, &tiers).await;
        let capacity_gb = match tiers.load_setting(CAPACITY_KEY).await {
            Some(raw) => match raw.parse::<f64>() {
                Ok(gb) if gb.is_finite() && gb >= 0.0 => gb,
                _ => {
                    warn!(value = %raw, "ignoring stored capacity");
                    config.capacity_gb
                }
            },
            None => config.capacity_gb,
        };

        let mut index = MetadataIndex::new();
        for meta in tiers.load_metadata().await? {
            if !meta.has_valid_checksum() {
                warn!(content_id = %meta.content_id, "dropping record with bad checksum");
                continue;
            }
            index.upsert(meta);
        }

        let ledger = ReplicationLedger::new(network, config.peer_timeout, config.replication_factor);
        let peers = PeerDirectory::shared(config.heartbeat_timeout);

        let mut engine = Self {
            config,
            local_peer,
            tiers,
            index,
            ledger,
            peers,
            capacity_gb,
            quota: StorageQuota::default(),
        };
        engine.recompute_quota();

        let report = engine.validate().await;
        info!(
            peer = %engine.local_peer,
            data_dir = %engine.config.data_dir.display(),
            records = engine.index.len(),
            recovered = report.recovered.len(),
            evicted = report.evicted.len(),
            "storage engine opened"
        );
        Ok(engine)
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    pub async fn add_file(&mut self, request: IngestRequest) -> Result<IngestOutcome> {
        if request.name.trim().is_empty() {
            return Err(EngineError::Validation("file name is empty".into()));
        }
        if request.data.is_empty() {
            return Err(EngineError::Validation("file is empty".into()));
        }
        if matches!(request.passphrase.as_deref(), Some("")) {
            return Err(EngineError::Validation("passphrase is empty".into()));
        }

        let content_id = hashing::hash(&request.data)?;
        let uploader = request.peer_id.clone().unwrap_or_else(|| self.local_peer.clone());

        if self.index.contains(&content_id) {
            return self.reingest(content_id, request, uploader).await;
        }

        let size = request.data.len() as u64;
        if !self.quota.fits(size) {
            return Err(EngineError::QuotaExceeded {
                needed_gb: StorageQuota::bytes_to_gb(size),
                available_gb: self.quota.available_gb,
            });
        }

        let mut meta = FileMetadata::new(
            content_id.clone(),
            request.name.trim(),
            request.mime_type,
            size,
            uploader.clone(),
        );
        meta.indexed = request.indexed;

        let payload = match request.passphrase.as_deref() {
            Some(passphrase) => {
                let (envelope, key_id) = crypto::wrap(&request.data, passphrase).map_err(EngineError::Encryption)?;
                meta.is_encrypted = true;
                meta.encryption_key_id = Some(key_id);
                Bytes::from(envelope)
            }
            None => request.data,
        };

        let written = self.tiers.put(&content_id, payload.clone()).await?;

        self.index.upsert(meta);
        self.ledger.register_local(&mut self.index, &content_id, &self.local_peer);
        if uploader != self.local_peer {
            self.ledger.record_remote_copy(&mut self.index, &content_id, &uploader);
        }

        let candidates: Vec<PeerId> = self
            .connected_peers()
            .into_iter()
            .filter(|peer| *peer != self.local_peer && *peer != uploader)
            .collect();
        let metadata = self.record(&content_id)?;
        let acked = self.ledger.propagate(&metadata, payload, &candidates).await;
        for peer in &acked {
            self.ledger.record_remote_copy(&mut self.index, &content_id, peer);
        }

        let metadata = self.record(&content_id)?;
        self.tiers.save_metadata(&metadata).await;
        if metadata.indexed {
            self.ledger.broadcast_add(&metadata).await;
        }
        self.recompute_quota();

        info!(
            content_id = %content_id,
            name = %metadata.name,
            size,
            encrypted = metadata.is_encrypted,
            tiers = ?written.tiers(),
            replicas = metadata.replicated_on.len(),
            "file ingested"
        );
        Ok(IngestOutcome {
            metadata,
            tiers: written,
            deduplicated: false,
            passphrase_ignored: false,
        })
    }

    /// Identical bytes again: refresh `last_modified`, add the uploader as a
    /// replica and put the blob back if the cache lost it. Quota and
    /// discovery are left alone.
    async fn reingest(&mut self, content_id: ContentId, request: IngestRequest, uploader: PeerId) -> Result<IngestOutcome> {
        let mut meta = self.record(&content_id)?;
        let passphrase_ignored = request.passphrase.is_some() && !meta.is_encrypted;
        if passphrase_ignored {
            warn!(content_id = %content_id, "content already stored unencrypted, passphrase ignored");
        }

        if !self.tiers.contains(Tier::Cache, &content_id).await {
            let payload = if !meta.is_encrypted {
                Some(request.data.clone())
            } else {
                match request.passphrase.as_deref() {
                    Some(passphrase)
                        if meta.encryption_key_id.as_deref() == Some(crypto::key_fingerprint(passphrase).as_str()) =>
                    {
                        let (envelope, _) = crypto::wrap(&request.data, passphrase).map_err(EngineError::Encryption)?;
                        Some(Bytes::from(envelope))
                    }
                    _ => {
                        debug!(content_id = %content_id, "re-ingest cannot rebuild the envelope without its passphrase");
                        None
                    }
                }
            };
            if let Some(payload) = payload {
                self.tiers.put(&content_id, payload).await?;
                meta.is_valid = true;
                meta.retry_count = 0;
            }
        }

        meta.last_modified = Utc::now();
        self.index.upsert(meta);
        self.ledger.register_local(&mut self.index, &content_id, &self.local_peer);
        if uploader != self.local_peer {
            self.ledger.record_remote_copy(&mut self.index, &content_id, &uploader);
        }

        let metadata = self.record(&content_id)?;
        self.tiers.save_metadata(&metadata).await;
        self.recompute_quota();

        info!(content_id = %content_id, uploader = %uploader, "duplicate content ingested");
        Ok(IngestOutcome {
            metadata,
            tiers: self.tiers.locate(&content_id).await,
            deduplicated: true,
            passphrase_ignored,
        })
    }

    // ------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------

    /// Plaintext bytes of `id`. Falls back to replica peers when every local
    /// tier misses.
    pub async fn get_file(&mut self, id: &ContentId, passphrase: Option<&str>) -> Result<Bytes> {
        let meta = self.record(id)?;
        if meta.is_encrypted {
            let Some(passphrase) = passphrase else {
                return Err(EngineError::PassphraseRequired(id.clone()));
            };
            let wrong_key = meta
                .encryption_key_id
                .as_deref()
                .is_some_and(|key_id| key_id != crypto::key_fingerprint(passphrase));
            if wrong_key {
                return Err(EngineError::Decryption {
                    content_id: id.clone(),
                    source: CryptoError::DecryptionFailed,
                });
            }
        }

        let stored = match self.tiers.get(id).await {
            Some(blob) => {
                debug!(content_id = %id, tier = %blob.tier(), "blob read");
                blob.into_bytes()
            }
            None => {
                let data = self
                    .fetch_from_replicas(&meta, passphrase)
                    .await
                    .ok_or_else(|| EngineError::NotFound(id.clone()))?;
                if let Err(e) = self.tiers.put(id, data.clone()).await {
                    warn!(content_id = %id, error = %e, "write-back of fetched blob failed");
                }
                data
            }
        };

        if !meta.is_valid {
            self.restore_validity(id).await;
        }

        match passphrase {
            Some(passphrase) if meta.is_encrypted => {
                let plain = crypto::unwrap(&stored, passphrase).map_err(|source| EngineError::Decryption {
                    content_id: id.clone(),
                    source,
                })?;
                Ok(Bytes::from(plain))
            }
            _ => Ok(stored),
        }
    }

    /// Encrypted replies are only accepted once they open under `passphrase`
    /// and the plaintext hashes to the content id.
    async fn fetch_from_replicas(&mut self, meta: &FileMetadata, passphrase: Option<&str>) -> Option<Bytes> {
        let connected = self.connected_peers();
        let mut replicas: Vec<PeerId> = meta
            .replicated_on
            .iter()
            .filter(|peer| **peer != self.local_peer)
            .cloned()
            .collect();
        if replicas.is_empty() {
            return None;
        }
        // Stable: connected peers first, set order otherwise.
        replicas.sort_by_key(|peer| !connected.contains(peer));

        let fetch = self
            .ledger
            .request_from_replicas(&meta.content_id, &replicas, |data| match (meta.is_encrypted, passphrase) {
                (false, _) => hashing::matches(&meta.content_id, data),
                (true, Some(passphrase)) => crypto::unwrap(data, passphrase)
                    .map(|plain| hashing::matches(&meta.content_id, &plain))
                    .unwrap_or(false),
                (true, None) => false,
            })
            .await;

        for peer in &fetch.responded {
            self.mark_peer_online(peer);
        }
        for peer in &fetch.disclaimed {
            self.ledger.forget_peer(&mut self.index, &meta.content_id, peer);
        }
        if !fetch.disclaimed.is_empty() {
            if let Some(updated) = self.index.get(&meta.content_id) {
                self.tiers.save_metadata(updated).await;
            }
        }

        fetch.found.map(|(peer, data)| {
            info!(content_id = %meta.content_id, peer = %peer, "blob fetched from replica");
            data
        })
    }

    async fn restore_validity(&mut self, id: &ContentId) {
        let Some(mut meta) = self.index.get(id).cloned() else {
            return;
        };
        meta.is_valid = true;
        meta.retry_count = 0;
        self.index.upsert(meta);
        self.ledger.register_local(&mut self.index, id, &self.local_peer);
        if let Some(meta) = self.index.get(id) {
            self.tiers.save_metadata(meta).await;
        }
        self.recompute_quota();
        info!(content_id = %id, "record valid again after read");
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Remove `id` from the index and every tier. Returns the removed record.
    pub async fn delete_file(&mut self, id: &ContentId) -> Result<FileMetadata> {
        let meta = self.index.remove(id).ok_or_else(|| EngineError::NotFound(id.clone()))?;

        self.tiers.delete(id).await;
        self.tiers.delete_metadata(id).await;

        let has_remote_replicas = meta.replicated_on.iter().any(|peer| *peer != self.local_peer);
        if meta.indexed || has_remote_replicas {
            self.ledger.broadcast_delete(id).await;
        }
        self.recompute_quota();

        info!(content_id = %id, name = %meta.name, size = meta.size, "file deleted");
        Ok(meta)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_file_index(&self) -> Vec<FileMetadata> {
        self.index.all()
    }

    pub fn search_files(&self, query: &str) -> Vec<FileMetadata> {
        self.index.search(query)
    }

    pub fn file(&self, id: &ContentId) -> Option<&FileMetadata> {
        self.index.get(id)
    }

    pub fn quota(&self) -> StorageQuota {
        self.quota
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tiers(&self) -> &TieredStore {
        &self.tiers
    }

    pub fn stats(&self) -> EngineStats {
        let directory = lock_directory(&self.peers);
        let mut stats = EngineStats {
            records: self.index.len(),
            cached_blobs: self.tiers.cache().len(),
            cache_bytes: self.tiers.cache().used_bytes(),
            cache_budget: self.tiers.cache().budget(),
            known_peers: directory.peer_count(),
            connected_peers: directory.connected_count(),
            ..EngineStats::default()
        };
        for meta in self.index.iter() {
            if meta.is_valid {
                stats.valid += 1;
            } else {
                stats.invalid += 1;
            }
            if meta.is_encrypted {
                stats.encrypted += 1;
            }
            if meta.indexed {
                stats.indexed += 1;
            }
        }
        stats
    }

    // ------------------------------------------------------------------
    // Settings and record flags
    // ------------------------------------------------------------------

    pub async fn set_capacity(&mut self, total_gb: f64) -> Result<StorageQuota> {
        if !total_gb.is_finite() || total_gb < 0.0 {
            return Err(EngineError::Validation(format!("invalid capacity: {total_gb}")));
        }
        self.capacity_gb = total_gb;
        let written = self.tiers.save_setting(CAPACITY_KEY, &total_gb.to_string()).await;
        if !written.is_durable() {
            warn!(capacity_gb = total_gb, "capacity not persisted");
        }
        self.recompute_quota();
        info!(capacity_gb = total_gb, "capacity updated");
        Ok(self.quota)
    }

    /// Toggle network-wide discovery. Enabling broadcasts an add, disabling
    /// broadcasts a delete.
    pub async fn set_indexed(&mut self, id: &ContentId, indexed: bool) -> Result<FileMetadata> {
        let mut meta = self.record(id)?;
        if meta.indexed == indexed {
            return Ok(meta);
        }
        meta.indexed = indexed;
        self.index.upsert(meta.clone());
        self.tiers.save_metadata(&meta).await;

        if indexed {
            self.ledger.broadcast_add(&meta).await;
        } else {
            self.ledger.broadcast_delete(id).await;
        }
        debug!(content_id = %id, indexed, "discovery toggled");
        Ok(meta)
    }

    /// Whether `passphrase` matches the fingerprint stored with `id`. Never
    /// decrypts. Unencrypted records always answer `false`.
    pub fn check_passphrase(&self, id: &ContentId, passphrase: &str) -> Result<bool> {
        let meta = self.index.get(id).ok_or_else(|| EngineError::NotFound(id.clone()))?;
        Ok(match (&meta.encryption_key_id, meta.is_encrypted) {
            (Some(key_id), true) => *key_id == crypto::key_fingerprint(passphrase),
            _ => false,
        })
    }

    /// Record a peer's claim to hold `id`, e.g. an ack received out of band.
    pub async fn record_remote_copy(&mut self, id: &ContentId, peer: &PeerId) -> Result<bool> {
        if !self.index.contains(id) {
            return Err(EngineError::NotFound(id.clone()));
        }
        let added = self.ledger.record_remote_copy(&mut self.index, id, peer);
        if added {
            if let Some(meta) = self.index.get(id) {
                self.tiers.save_metadata(meta).await;
            }
        }
        Ok(added)
    }

    // ------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------

    /// Run one recovery sweep over the whole index.
    pub async fn validate(&mut self) -> SweepReport {
        let report = recovery::sweep(&mut self.index, &self.tiers, self.config.max_recovery_retries).await;

        for id in &report.recovered {
            if self.ledger.register_local(&mut self.index, id, &self.local_peer) {
                if let Some(meta) = self.index.get(id) {
                    self.tiers.save_metadata(meta).await;
                }
            }
        }
        for meta in &report.evicted {
            if meta.indexed {
                self.ledger.broadcast_delete(&meta.content_id).await;
            }
        }
        self.recompute_quota();

        if !report.is_clean() {
            info!(
                checked = report.checked,
                recovered = report.recovered.len(),
                pending = report.pending.len(),
                evicted = report.evicted.len(),
                "recovery sweep"
            );
        }
        report
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    /// Heartbeat from `peer`. Returns `true` if it was new or came back.
    pub fn mark_peer_online(&self, peer: &PeerId) -> bool {
        if *peer == self.local_peer {
            return false;
        }
        let came_online = lock_directory(&self.peers).mark_online(peer, Utc::now());
        if came_online {
            info!(peer = %peer, "peer online");
        }
        came_online
    }

    /// Merge the collaborator's peer list into the directory. Returns how
    /// many peers were reported; a failing collaborator reports none.
    pub async fn refresh_peers(&self) -> usize {
        let listed = tokio::time::timeout(self.config.peer_timeout, self.ledger.network().peer_list()).await;
        let reported = match listed {
            Ok(Ok(reported)) => reported,
            Ok(Err(e)) => {
                warn!(error = %e, "peer list failed");
                return 0;
            }
            Err(_) => {
                warn!("peer list timed out");
                return 0;
            }
        };

        let count = reported.len();
        let mut directory = lock_directory(&self.peers);
        for info in reported.into_iter().filter(|info| info.peer_id != self.local_peer) {
            directory.merge(info);
        }
        debug!(count, "peer list merged");
        count
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        lock_directory(&self.peers).all()
    }

    /// Connected peers, after expiring any that went silent. Does not rely
    /// on the heartbeat monitor running.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut directory = lock_directory(&self.peers);
        for peer in directory.check_heartbeats(Utc::now()) {
            info!(peer = %peer, "Peer heartbeat timed out, marked offline");
        }
        directory.connected_peers()
    }

    /// Handle for a collaborator that wants to report heartbeats directly.
    pub fn peer_directory(&self) -> SharedPeerDirectory {
        Arc::clone(&self.peers)
    }

    /// Start the background task that marks silent peers offline.
    pub fn spawn_heartbeat(&self) -> HeartbeatMonitor {
        spawn_heartbeat_monitor(self.peer_directory(), self.config.heartbeat_interval)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn record(&self, id: &ContentId) -> Result<FileMetadata> {
        self.index.get(id).cloned().ok_or_else(|| EngineError::NotFound(id.clone()))
    }

    fn recompute_quota(&mut self) {
        self.quota = quota::recompute(&self.index, self.capacity_gb, self.config.price_per_gb);
    }
}

/// Configured id, else the persisted one, else a fresh one. Persisted
/// whenever it differs from what is stored.
async fn resolve_local_peer(config: &EngineConfig, tiers: &TieredStore) -> PeerId {
    let stored = tiers.load_setting(LOCAL_PEER_KEY).await.map(PeerId::new);
    let peer = config
        .peer_id
        .clone()
        .or_else(|| stored.clone())
        .unwrap_or_else(PeerId::generate);

    if stored.as_ref() != Some(&peer) {
        let written = tiers.save_setting(LOCAL_PEER_KEY, peer.as_str()).await;
        if !written.is_durable() {
            warn!(peer = %peer, "local peer id not persisted");
        }
    }
    peer
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::testing::MemoryNetwork;

    fn config(dir: &TempDir) -> EngineConfig {
        let mut config = EngineConfig::for_dir(dir.path());
        config.peer_id = Some(PeerId::from("local"));
        config.peer_timeout = Duration::from_millis(100);
        config
    }

    async fn open(dir: &TempDir) -> (StorageEngine, Arc<MemoryNetwork>) {
        let network = Arc::new(MemoryNetwork::new());
        let engine = StorageEngine::open(config(dir), network.clone()).await.unwrap();
        (engine, network)
    }

    #[tokio::test]
    async fn test_rejects_empty_input() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;

        let err = engine.add_file(IngestRequest::new("  ", &b"data"[..])).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = engine.add_file(IngestRequest::new("empty.txt", Bytes::new())).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = engine
            .add_file(IngestRequest::new("a.txt", &b"data"[..]).passphrase(""))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        assert!(engine.get_file_index().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_registers_local_peer() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;

        let outcome = engine
            .add_file(IngestRequest::new("notes.txt", &b"some notes"[..]).mime_type("text/plain"))
            .await
            .unwrap();

        assert!(!outcome.deduplicated);
        assert!(outcome.tiers.cache && outcome.tiers.transactional && outcome.tiers.flat);
        let meta = &outcome.metadata;
        assert_eq!(meta.size, 10);
        assert_eq!(meta.mime_type, "text/plain");
        assert_eq!(meta.owner_peer_id, PeerId::from("local"));
        assert_eq!(meta.replicated_on.iter().collect::<Vec<_>>(), vec![&PeerId::from("local")]);
    }

    #[tokio::test]
    async fn test_reingest_adds_uploader_without_double_counting() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;

        let first = engine.add_file(IngestRequest::new("a.bin", &b"dup"[..])).await.unwrap();
        let used = engine.quota().used_gb;

        let second = engine
            .add_file(IngestRequest::new("b.bin", &b"dup"[..]).from_peer(PeerId::from("remote")))
            .await
            .unwrap();

        assert!(second.deduplicated);
        assert_eq!(second.metadata.content_id, first.metadata.content_id);
        assert_eq!(second.metadata.id, first.metadata.id);
        assert!(second.metadata.last_modified >= first.metadata.last_modified);
        assert!(second.metadata.replicated_on.contains(&PeerId::from("remote")));
        assert_eq!(engine.get_file_index().len(), 1);
        assert_eq!(engine.quota().used_gb, used);
    }

    #[tokio::test]
    async fn test_reingest_flags_passphrase_on_plaintext_content() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;

        engine.add_file(IngestRequest::new("plain.txt", &b"in the clear"[..])).await.unwrap();
        let again = engine
            .add_file(IngestRequest::new("plain.txt", &b"in the clear"[..]).passphrase("pw"))
            .await
            .unwrap();

        assert!(again.deduplicated);
        assert!(again.passphrase_ignored);
        assert!(!again.metadata.is_encrypted);
        let read = engine.get_file(&again.metadata.content_id, None).await.unwrap();
        assert_eq!(read.as_ref(), b"in the clear");
    }

    #[tokio::test]
    async fn test_reingest_puts_lost_blob_back() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;
        let id = engine
            .add_file(IngestRequest::new("lost.bin", &b"put me back"[..]))
            .await
            .unwrap()
            .metadata
            .content_id;

        engine.tiers().delete(&id).await;
        engine.validate().await;
        assert!(!engine.file(&id).unwrap().is_valid);
        assert_eq!(engine.quota().used_gb, 0.0);

        let again = engine.add_file(IngestRequest::new("lost.bin", &b"put me back"[..])).await.unwrap();
        assert!(again.deduplicated);
        assert!(!again.passphrase_ignored);
        assert!(again.tiers.cache && again.tiers.transactional && again.tiers.flat);
        assert!(again.metadata.is_valid);
        assert_eq!(again.metadata.retry_count, 0);
        assert!(engine.quota().used_gb > 0.0);
    }

    #[tokio::test]
    async fn test_reingest_rewraps_encrypted_blob_only_with_its_passphrase() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;
        let id = engine
            .add_file(IngestRequest::new("sealed.txt", &b"sealed content"[..]).passphrase("pw"))
            .await
            .unwrap()
            .metadata
            .content_id;
        engine.tiers().delete(&id).await;

        let wrong = engine
            .add_file(IngestRequest::new("sealed.txt", &b"sealed content"[..]).passphrase("other"))
            .await
            .unwrap();
        assert!(wrong.tiers.is_empty());
        assert!(!wrong.passphrase_ignored);

        let right = engine
            .add_file(IngestRequest::new("sealed.txt", &b"sealed content"[..]).passphrase("pw"))
            .await
            .unwrap();
        assert!(right.tiers.cache);
        assert!(right.metadata.is_encrypted);
        assert_eq!(engine.get_file(&id, Some("pw")).await.unwrap().as_ref(), b"sealed content");
    }

    #[tokio::test]
    async fn test_connected_peers_expire_without_monitor() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.heartbeat_timeout = Duration::from_millis(50);
        let engine = StorageEngine::open(config, Arc::new(MemoryNetwork::new())).await.unwrap();

        let peer = PeerId::from("quiet");
        engine.mark_peer_online(&peer);
        assert_eq!(engine.connected_peers(), vec![peer.clone()]);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(engine.connected_peers().is_empty());
        assert_eq!(engine.peers().len(), 1);
    }

    #[tokio::test]
    async fn test_quota_exceeded_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;
        engine.set_capacity(0.0).await.unwrap();

        let err = engine.add_file(IngestRequest::new("x", &b"too much"[..])).await.unwrap_err();
        assert!(matches!(err, EngineError::QuotaExceeded { .. }));
        assert!(engine.get_file_index().is_empty());
        assert!(engine.tiers().cache().is_empty());
    }

    #[tokio::test]
    async fn test_encrypted_round_trip_and_passphrase_check() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;

        let outcome = engine
            .add_file(IngestRequest::new("secret.txt", &b"top secret"[..]).passphrase("pw"))
            .await
            .unwrap();
        let id = outcome.metadata.content_id.clone();
        assert!(outcome.metadata.is_encrypted);
        assert_eq!(outcome.metadata.size, 10);

        let stored = engine.tiers().get(&id).await.unwrap().into_bytes();
        assert_ne!(stored.as_ref(), b"top secret");

        assert_eq!(engine.get_file(&id, Some("pw")).await.unwrap().as_ref(), b"top secret");
        assert!(matches!(
            engine.get_file(&id, Some("wrong")).await,
            Err(EngineError::Decryption { .. })
        ));
        assert!(matches!(
            engine.get_file(&id, None).await,
            Err(EngineError::PassphraseRequired(_))
        ));

        assert!(engine.check_passphrase(&id, "pw").unwrap());
        assert!(!engine.check_passphrase(&id, "nope").unwrap());
    }

    #[tokio::test]
    async fn test_set_indexed_broadcasts() {
        let dir = TempDir::new().unwrap();
        let (mut engine, net) = open(&dir).await;
        let id = engine
            .add_file(IngestRequest::new("p.txt", &b"private"[..]))
            .await
            .unwrap()
            .metadata
            .content_id;
        assert!(net.added().is_empty());

        engine.set_indexed(&id, true).await.unwrap();
        engine.set_indexed(&id, true).await.unwrap();
        assert_eq!(net.added(), vec![id.clone()]);

        engine.set_indexed(&id, false).await.unwrap();
        assert_eq!(net.deleted(), vec![id]);
    }

    #[tokio::test]
    async fn test_ingest_propagates_to_connected_peers() {
        let dir = TempDir::new().unwrap();
        let (mut engine, net) = open(&dir).await;
        let (a, b) = (PeerId::from("a"), PeerId::from("b"));
        net.add_peer(a.clone());
        net.add_peer(b.clone());
        net.set_unreachable(&b);
        engine.mark_peer_online(&a);
        engine.mark_peer_online(&b);

        let meta = engine
            .add_file(IngestRequest::new("r.txt", &b"replicate me"[..]).indexed(true))
            .await
            .unwrap()
            .metadata;

        assert!(net.holds(&a, &meta.content_id));
        assert!(meta.replicated_on.contains(&a));
        assert!(!meta.replicated_on.contains(&b));
        assert_eq!(net.added(), vec![meta.content_id]);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;
        let id = hashing::hash(b"never stored").unwrap();

        assert!(matches!(engine.delete_file(&id).await, Err(EngineError::NotFound(_))));
        assert!(matches!(engine.get_file(&id, None).await, Err(EngineError::NotFound(_))));
        assert!(matches!(
            engine.record_remote_copy(&id, &PeerId::from("x")).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_peers_merges_list() {
        let dir = TempDir::new().unwrap();
        let (engine, net) = open(&dir).await;
        net.add_peer(PeerId::from("a"));
        net.add_peer(PeerId::from("local"));

        assert_eq!(engine.refresh_peers().await, 2);
        assert_eq!(engine.connected_peers(), vec![PeerId::from("a")]);
        assert_eq!(engine.stats().known_peers, 1);
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let dir = TempDir::new().unwrap();
        let (mut engine, _net) = open(&dir).await;
        engine
            .add_file(IngestRequest::new("a", &b"aaa"[..]).indexed(true))
            .await
            .unwrap();
        engine
            .add_file(IngestRequest::new("b", &b"bbbb"[..]).passphrase("pw"))
            .await
            .unwrap();

        let stats = engine.stats();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.valid, 2);
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.encrypted, 1);
        assert_eq!(stats.cached_blobs, 2);
    }
}
