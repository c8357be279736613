//! Replication ledger.
//!
//! Records which peers claim to hold a copy of each piece of content and is
//! the only component that calls into the network collaborator. Claims are
//! advisory: nothing here proves a peer actually stores the bytes. Network
//! failures are logged and swallowed; retrying is the collaborator's call.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cairn_shared::{ContentId, FileMetadata, PeerId};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::NetworkError;
use crate::index::MetadataIndex;
use crate::network::Network;

/// Outcome of asking replica peers for a blob.
#[derive(Debug, Default)]
pub struct RemoteFetch {
    /// First acceptable payload and the peer that served it.
    pub found: Option<(PeerId, Bytes)>,
    /// Peers that answered at all, whether or not they had the blob.
    pub responded: Vec<PeerId>,
    /// Peers that answered that they hold no copy.
    pub disclaimed: Vec<PeerId>,
}

pub struct ReplicationLedger {
    network: Arc<dyn Network>,
    peer_timeout: Duration,
    replication_factor: usize,
}

impl ReplicationLedger {
    pub fn new(network: Arc<dyn Network>, peer_timeout: Duration, replication_factor: usize) -> Self {
        Self {
            network,
            peer_timeout,
            replication_factor,
        }
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    /// Add the local peer to the record's replica set. Idempotent; returns
    /// `true` only when the set changed.
    pub fn register_local(&self, index: &mut MetadataIndex, id: &ContentId, local: &PeerId) -> bool {
        add_claim(index, id, local)
    }

    /// Record an unverified claim that `peer` holds a copy.
    pub fn record_remote_copy(&self, index: &mut MetadataIndex, id: &ContentId, peer: &PeerId) -> bool {
        let added = add_claim(index, id, peer);
        if added {
            debug!(content_id = %id, peer = %peer, "remote copy recorded");
        }
        added
    }

    /// Drop a peer's claim. The last claim on a valid record is kept.
    pub fn forget_peer(&self, index: &mut MetadataIndex, id: &ContentId, peer: &PeerId) -> bool {
        let Some(mut meta) = index.get(id).cloned() else {
            return false;
        };
        if meta.is_valid && meta.replicated_on.len() == 1 && meta.replicated_on.contains(peer) {
            return false;
        }
        if !meta.replicated_on.remove(peer) {
            return false;
        }
        index.upsert(meta);
        debug!(content_id = %id, peer = %peer, "replica claim dropped");
        true
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    pub async fn broadcast_add(&self, metadata: &FileMetadata) {
        let sent = tokio::time::timeout(self.peer_timeout, self.network.on_file_added(metadata)).await;
        match sent {
            Ok(Ok(())) => debug!(content_id = %metadata.content_id, "add broadcast"),
            Ok(Err(e)) => warn!(content_id = %metadata.content_id, error = %e, "add broadcast failed"),
            Err(_) => warn!(content_id = %metadata.content_id, "add broadcast timed out"),
        }
    }

    pub async fn broadcast_delete(&self, id: &ContentId) {
        let sent = tokio::time::timeout(self.peer_timeout, self.network.on_file_deleted(id)).await;
        match sent {
            Ok(Ok(())) => debug!(content_id = %id, "delete broadcast"),
            Ok(Err(e)) => warn!(content_id = %id, error = %e, "delete broadcast failed"),
            Err(_) => warn!(content_id = %id, "delete broadcast timed out"),
        }
    }

    // ------------------------------------------------------------------
    // Remote transfer
    // ------------------------------------------------------------------

    /// Offer `data` to up to `replication_factor` of `candidates`
    /// concurrently. Returns the peers that acknowledged.
    pub async fn propagate(&self, metadata: &FileMetadata, data: Bytes, candidates: &[PeerId]) -> Vec<PeerId> {
        let targets: Vec<&PeerId> = candidates.iter().take(self.replication_factor).collect();
        if targets.is_empty() {
            return Vec::new();
        }

        let sends = targets.iter().map(|peer| {
            let data = data.clone();
            async move {
                let sent = tokio::time::timeout(
                    self.peer_timeout,
                    self.network.send_blob(peer, &metadata.content_id, data, metadata),
                )
                .await
                .unwrap_or_else(|_| Err(NetworkError::Timeout((*peer).clone())));
                (*peer, sent)
            }
        });

        let mut acked = Vec::new();
        for (peer, sent) in join_all(sends).await {
            match sent {
                Ok(()) => acked.push(peer.clone()),
                Err(e) => warn!(content_id = %metadata.content_id, peer = %peer, error = %e, "replication offer failed"),
            }
        }

        info!(
            content_id = %metadata.content_id,
            offered = targets.len(),
            acked = acked.len(),
            "replication attempted"
        );
        acked
    }

    /// Ask `peers` one at a time, each under the per-peer timeout, until one
    /// returns a payload `accept` agrees with.
    pub async fn request_from_replicas<F>(&self, id: &ContentId, peers: &[PeerId], accept: F) -> RemoteFetch
    where
        F: Fn(&Bytes) -> bool,
    {
        let mut fetch = RemoteFetch::default();

        for peer in peers {
            let reply = tokio::time::timeout(self.peer_timeout, self.network.request_blob(peer, id))
                .await
                .unwrap_or_else(|_| Err(NetworkError::Timeout(peer.clone())));

            match reply {
                Ok(Some(data)) => {
                    fetch.responded.push(peer.clone());
                    if accept(&data) {
                        debug!(content_id = %id, peer = %peer, size = data.len(), "blob fetched from replica");
                        fetch.found = Some((peer.clone(), data));
                        break;
                    }
                    warn!(content_id = %id, peer = %peer, "replica returned mismatched bytes");
                }
                Ok(None) => {
                    fetch.responded.push(peer.clone());
                    fetch.disclaimed.push(peer.clone());
                }
                Err(e) => warn!(content_id = %id, peer = %peer, error = %e, "replica request failed"),
            }
        }

        fetch
    }
}

fn add_claim(index: &mut MetadataIndex, id: &ContentId, peer: &PeerId) -> bool {
    let Some(mut meta) = index.get(id).cloned() else {
        return false;
    };
    if !meta.replicated_on.insert(peer.clone()) {
        return false;
    }
    index.upsert(meta);
    true
}
