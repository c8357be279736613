//! End-to-end scenarios for the storage engine: ingest, retrieval, dedup,
//! quota, recovery, encryption, remote fallback and restart.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cairn_engine::testing::MemoryNetwork;
use cairn_engine::{EngineConfig, EngineError, IngestRequest, StorageEngine};
use cairn_shared::{hashing, PeerId};
use cairn_store::Tier;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

const GIB: f64 = (1u64 << 30) as f64;

/// Logs show up with `RUST_LOG=cairn_engine=debug cargo test -- --nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn local() -> PeerId {
    PeerId::from("local")
}

fn config(dir: &TempDir) -> EngineConfig {
    init_tracing();
    let mut config = EngineConfig::for_dir(dir.path());
    config.peer_id = Some(local());
    config.peer_timeout = Duration::from_millis(100);
    config
}

async fn open_with(dir: &TempDir, network: Arc<MemoryNetwork>) -> StorageEngine {
    StorageEngine::open(config(dir), network).await.unwrap()
}

async fn open(dir: &TempDir) -> (StorageEngine, Arc<MemoryNetwork>) {
    let network = Arc::new(MemoryNetwork::new());
    let engine = open_with(dir, network.clone()).await;
    (engine, network)
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Ingest, list, search, delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_pdf_lifecycle() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _net) = open(&dir).await;
    let data = patterned(3 * 1024 * 1024);

    let outcome = engine
        .add_file(IngestRequest::new("report.pdf", data.clone()).mime_type("application/pdf"))
        .await
        .unwrap();
    let id = outcome.metadata.content_id.clone();

    let files = engine.get_file_index();
    assert_eq!(files.len(), 1);
    let meta = &files[0];
    assert_eq!(meta.size, 3 * 1024 * 1024);
    assert!(!meta.is_encrypted);
    assert!(!meta.indexed);
    assert_eq!(meta.replicated_on.iter().cloned().collect::<Vec<_>>(), vec![local()]);

    assert_eq!(engine.search_files("report").len(), 1);
    assert!(engine.search_files("xyz").is_empty());

    let read = engine.get_file(&id, None).await.unwrap();
    assert_eq!(read.as_ref(), data.as_slice());

    engine.delete_file(&id).await.unwrap();
    assert!(engine.get_file_index().is_empty());
    assert_eq!(engine.quota().used_gb, 0.0);
    assert!(engine.tiers().locate(&id).await.is_empty());
}

#[tokio::test]
async fn identical_bytes_deduplicate() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _net) = open(&dir).await;
    let data = patterned(4096);

    let first = engine.add_file(IngestRequest::new("one.bin", data.clone())).await.unwrap();
    let quota_after_first = engine.quota();
    let second = engine
        .add_file(IngestRequest::new("two.bin", data).from_peer(PeerId::from("peer-b")))
        .await
        .unwrap();

    assert_eq!(first.metadata.content_id, second.metadata.content_id);
    assert!(second.deduplicated);
    assert_eq!(engine.get_file_index().len(), 1);
    assert_eq!(engine.quota().used_gb, quota_after_first.used_gb);
    assert_eq!(
        second.metadata.replicated_on.iter().cloned().collect::<Vec<_>>(),
        vec![local(), PeerId::from("peer-b")]
    );
}

#[tokio::test]
async fn quota_tracks_index_exactly() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _net) = open(&dir).await;

    let sizes = [1usize, 1000, 65_536, 1_048_577];
    let mut ids = Vec::new();
    for (i, size) in sizes.iter().enumerate() {
        let mut data = patterned(*size);
        data[0] = i as u8 + 100;
        ids.push(engine.add_file(IngestRequest::new(format!("f{i}"), data)).await.unwrap().metadata);
    }

    let expected: u64 = engine.get_file_index().iter().map(|m| m.size).sum();
    assert_eq!(engine.quota().used_gb, expected as f64 / GIB);

    let victim = &ids[3];
    let before = engine.quota().used_gb;
    engine.delete_file(&victim.content_id).await.unwrap();
    let after = engine.quota().used_gb;
    assert!((before - after - victim.size as f64 / GIB).abs() < 1e-15);
    assert_eq!(engine.quota().available_gb, engine.quota().total_capacity_gb - after);
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_restores_cache_from_transactional_tier() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _net) = open(&dir).await;
    let id = engine
        .add_file(IngestRequest::new("keep.txt", &b"keep me around"[..]))
        .await
        .unwrap()
        .metadata
        .content_id;

    engine.tiers().cache().remove(&id);
    engine.tiers().flat().delete(&id).await.unwrap();

    let report = engine.validate().await;
    // Still valid, so nothing to report; the cache is filled again anyway.
    assert!(report.is_clean());
    assert_eq!(report.healthy, 1);
    assert!(engine.tiers().contains(Tier::Cache, &id).await);
    let meta = engine.file(&id).unwrap();
    assert!(meta.is_valid);
    assert_eq!(meta.retry_count, 0);
}

#[tokio::test]
async fn unrecoverable_record_evicted_after_three_sweeps() {
    let dir = TempDir::new().unwrap();
    let (mut engine, net) = open(&dir).await;
    let id = engine
        .add_file(IngestRequest::new("lost.txt", &b"about to vanish"[..]).indexed(true))
        .await
        .unwrap()
        .metadata
        .content_id;
    assert!(engine.quota().used_gb > 0.0);

    engine.tiers().delete(&id).await;

    for _ in 0..2 {
        let report = engine.validate().await;
        assert_eq!(report.pending, vec![id.clone()]);
        assert!(!engine.file(&id).unwrap().is_valid);
        // Invalid records do not count against the quota.
        assert_eq!(engine.quota().used_gb, 0.0);
    }

    let report = engine.validate().await;
    assert_eq!(report.evicted_ids(), vec![id.clone()]);
    assert!(engine.file(&id).is_none());
    assert_eq!(engine.quota().used_gb, 0.0);
    assert_eq!(net.deleted(), vec![id]);
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

#[tokio::test]
async fn encrypted_file_requires_right_passphrase() {
    let dir = TempDir::new().unwrap();
    let (mut engine, _net) = open(&dir).await;
    let data = patterned(10_000);

    let meta = engine
        .add_file(IngestRequest::new("diary.txt", data.clone()).passphrase("pw"))
        .await
        .unwrap()
        .metadata;
    assert!(meta.is_encrypted);
    assert_eq!(meta.size, 10_000);
    assert!(meta.encryption_key_id.is_some());

    let read = engine.get_file(&meta.content_id, Some("pw")).await.unwrap();
    assert_eq!(read.as_ref(), data.as_slice());

    let err = engine.get_file(&meta.content_id, Some("wrong")).await.unwrap_err();
    assert!(matches!(err, EngineError::Decryption { .. }));

    let err = engine.get_file(&meta.content_id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::PassphraseRequired(_)));
}

// ---------------------------------------------------------------------------
// Remote fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn local_miss_falls_back_to_replica() {
    let dir = TempDir::new().unwrap();
    let (mut engine, net) = open(&dir).await;
    let replica = PeerId::from("replica");
    net.add_peer(replica.clone());
    engine.mark_peer_online(&replica);

    let data = patterned(2048);
    let meta = engine
        .add_file(IngestRequest::new("shared.bin", data.clone()))
        .await
        .unwrap()
        .metadata;
    assert!(net.holds(&replica, &meta.content_id));

    engine.tiers().delete(&meta.content_id).await;

    let read = engine.get_file(&meta.content_id, None).await.unwrap();
    assert_eq!(read.as_ref(), data.as_slice());
    // Written back through the tiers.
    assert!(engine.tiers().contains(Tier::Cache, &meta.content_id).await);
    assert!(engine.tiers().contains(Tier::Transactional, &meta.content_id).await);
}

#[tokio::test]
async fn stalled_and_lying_replicas_are_skipped() {
    let dir = TempDir::new().unwrap();
    let (mut engine, net) = open(&dir).await;
    let data = patterned(512);
    let id = hashing::hash(&data).unwrap();

    engine.add_file(IngestRequest::new("x.bin", data.clone())).await.unwrap();

    let (slow, liar, good) = (PeerId::from("a-slow"), PeerId::from("b-liar"), PeerId::from("c-good"));
    for peer in [&slow, &liar, &good] {
        net.add_peer(peer.clone());
        engine.record_remote_copy(&id, peer).await.unwrap();
    }
    net.set_stalled(&slow);
    net.store(&liar, &id, Bytes::from_static(b"not the real bytes"));
    net.store(&good, &id, Bytes::from(data.clone()));

    engine.tiers().delete(&id).await;

    let read = engine.get_file(&id, None).await.unwrap();
    assert_eq!(read.as_ref(), data.as_slice());
    // Answering counts as a heartbeat.
    assert!(engine.connected_peers().contains(&good));
}

#[tokio::test]
async fn encrypted_replica_must_open_before_write_back() {
    let dir = TempDir::new().unwrap();
    let (mut engine, net) = open(&dir).await;
    let data = patterned(4096);

    let id = engine
        .add_file(IngestRequest::new("sealed.bin", data.clone()).passphrase("pw"))
        .await
        .unwrap()
        .metadata
        .content_id;
    let envelope = engine.tiers().get(&id).await.unwrap().into_bytes();

    let (liar, good) = (PeerId::from("a-liar"), PeerId::from("b-good"));
    for peer in [&liar, &good] {
        net.add_peer(peer.clone());
        engine.record_remote_copy(&id, peer).await.unwrap();
    }
    net.store(&liar, &id, Bytes::from(vec![0u8; envelope.len()]));
    net.store(&good, &id, envelope.clone());

    engine.tiers().delete(&id).await;

    let read = engine.get_file(&id, Some("pw")).await.unwrap();
    assert_eq!(read.as_ref(), data.as_slice());
    let stored = engine.tiers().get(&id).await.unwrap().into_bytes();
    assert_eq!(stored, envelope);
    assert!(engine.tiers().contains(Tier::Transactional, &id).await);

    // A wrong passphrase is refused before any replica is asked.
    engine.tiers().delete(&id).await;
    let err = engine.get_file(&id, Some("wrong")).await.unwrap_err();
    assert!(matches!(err, EngineError::Decryption { .. }));
    assert!(engine.tiers().locate(&id).await.is_empty());
}

#[tokio::test]
async fn missing_everywhere_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (mut engine, net) = open(&dir).await;
    let empty = PeerId::from("empty");
    net.add_peer(empty.clone());

    let id = engine
        .add_file(IngestRequest::new("gone.bin", &b"gone"[..]))
        .await
        .unwrap()
        .metadata
        .content_id;
    engine.record_remote_copy(&id, &empty).await.unwrap();
    engine.tiers().delete(&id).await;

    let err = engine.get_file(&id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    // The peer said it holds nothing, so its claim is dropped.
    assert!(!engine.file(&id).unwrap().replicated_on.contains(&empty));
}

// ---------------------------------------------------------------------------
// Restart
// ---------------------------------------------------------------------------

#[tokio::test]
async fn state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let data = patterned(8192);
    let id = {
        let (mut engine, _net) = open(&dir).await;
        engine.set_capacity(42.0).await.unwrap();
        engine
            .add_file(IngestRequest::new("persist.bin", data.clone()).indexed(true))
            .await
            .unwrap()
            .metadata
            .content_id
    };

    let mut config = config(&dir);
    config.peer_id = None;
    let mut engine = StorageEngine::open(config, Arc::new(MemoryNetwork::new())).await.unwrap();

    assert_eq!(engine.local_peer_id(), &local());
    assert_eq!(engine.quota().total_capacity_gb, 42.0);
    let meta = engine.file(&id).unwrap();
    assert!(meta.indexed);
    assert!(meta.is_valid);
    assert_eq!(engine.get_file(&id, None).await.unwrap().as_ref(), data.as_slice());
}

#[tokio::test]
async fn reopening_a_clean_store_reports_nothing() {
    let dir = TempDir::new().unwrap();
    {
        let (mut engine, _net) = open(&dir).await;
        for i in 0..3u8 {
            let mut data = patterned(1024);
            data[0] = i;
            engine.add_file(IngestRequest::new(format!("f{i}"), data)).await.unwrap();
        }
        engine
            .add_file(IngestRequest::new("sealed", patterned(100)).passphrase("pw"))
            .await
            .unwrap();
    }

    let (mut engine, _net) = open(&dir).await;
    assert_eq!(engine.get_file_index().len(), 4);
    assert!(engine.get_file_index().iter().all(|meta| meta.is_valid));

    // Same state the opening sweep saw: durable tiers only.
    for meta in engine.get_file_index() {
        engine.tiers().cache().remove(&meta.content_id);
    }
    let report = engine.validate().await;
    assert!(report.is_clean());
    assert_eq!(report.healthy, 4);
    assert_eq!(engine.tiers().cache().len(), 4);
}

#[tokio::test]
async fn corrupt_records_dropped_on_open() {
    let dir = TempDir::new().unwrap();
    let id = {
        let (mut engine, _net) = open(&dir).await;
        let meta = engine
            .add_file(IngestRequest::new("tamper.bin", &b"tamper"[..]))
            .await
            .unwrap()
            .metadata;
        let mut tampered = meta.clone();
        tampered.checksum = "0".repeat(32);
        tampered.last_modified = meta.last_modified + chrono::Duration::seconds(1);
        engine.tiers().save_metadata(&tampered).await;
        meta.content_id
    };

    let (engine, _net) = open(&dir).await;
    assert!(engine.file(&id).is_none());
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_peers_go_offline() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.heartbeat_interval = Duration::from_millis(10);
    config.heartbeat_timeout = Duration::from_millis(50);
    let engine = StorageEngine::open(config, Arc::new(MemoryNetwork::new())).await.unwrap();

    let peer = PeerId::from("chatty");
    assert!(engine.mark_peer_online(&peer));
    let monitor = engine.spawn_heartbeat();

    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.shutdown().await;

    assert!(engine.connected_peers().is_empty());
    assert_eq!(engine.peers().len(), 1);
    assert!(engine.mark_peer_online(&peer));
}
