//! In-memory network collaborator for tests.
//!
//! Peers are plain names with a blob map each. Individual peers can be made
//! unreachable (every call fails) or stalled (every call hangs forever, so
//! only the engine's per-peer timeout gets it unstuck).

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use cairn_shared::{ContentId, FileMetadata, PeerId, PeerInfo};
use chrono::Utc;

use crate::error::NetworkError;
use crate::network::Network;

#[derive(Default)]
struct State {
    peers: Vec<PeerId>,
    blobs: HashMap<PeerId, HashMap<ContentId, Bytes>>,
    unreachable: HashSet<PeerId>,
    stalled: HashSet<PeerId>,
    fail_broadcasts: bool,
    added: Vec<ContentId>,
    deleted: Vec<ContentId>,
}

enum Access {
    Ready,
    Stall,
}

#[derive(Default)]
pub struct MemoryNetwork {
    state: Mutex<State>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_peer(&self, peer: PeerId) {
        let mut state = self.state();
        if !state.peers.contains(&peer) {
            state.peers.push(peer);
        }
    }

    pub fn set_unreachable(&self, peer: &PeerId) {
        self.state().unreachable.insert(peer.clone());
    }

    pub fn set_stalled(&self, peer: &PeerId) {
        self.state().stalled.insert(peer.clone());
    }

    pub fn fail_broadcasts(&self, fail: bool) {
        self.state().fail_broadcasts = fail;
    }

    /// Seed `peer` with a blob, as if it had been replicated earlier.
    pub fn store(&self, peer: &PeerId, id: &ContentId, data: Bytes) {
        self.state()
            .blobs
            .entry(peer.clone())
            .or_default()
            .insert(id.clone(), data);
    }

    pub fn holds(&self, peer: &PeerId, id: &ContentId) -> bool {
        self.state()
            .blobs
            .get(peer)
            .map(|blobs| blobs.contains_key(id))
            .unwrap_or(false)
    }

    /// Content ids announced through `on_file_added`, in call order.
    pub fn added(&self) -> Vec<ContentId> {
        self.state().added.clone()
    }

    /// Content ids announced through `on_file_deleted`, in call order.
    pub fn deleted(&self) -> Vec<ContentId> {
        self.state().deleted.clone()
    }

    fn access(&self, peer: &PeerId) -> Result<Access, NetworkError> {
        let state = self.state();
        if !state.peers.contains(peer) || state.unreachable.contains(peer) {
            return Err(NetworkError::Unreachable(peer.clone()));
        }
        if state.stalled.contains(peer) {
            return Ok(Access::Stall);
        }
        Ok(Access::Ready)
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn peer_list(&self) -> Result<Vec<PeerInfo>, NetworkError> {
        let state = self.state();
        let now = Utc::now();
        Ok(state
            .peers
            .iter()
            .map(|peer| {
                let mut info = PeerInfo::new(peer.clone(), now);
                if let Some(blobs) = state.blobs.get(peer) {
                    info.files_count = blobs.len() as u64;
                    info.storage_used = blobs.values().map(|b| b.len() as u64).sum();
                }
                info.is_connected = !state.unreachable.contains(peer);
                info
            })
            .collect())
    }

    async fn send_blob(
        &self,
        peer: &PeerId,
        id: &ContentId,
        data: Bytes,
        _metadata: &FileMetadata,
    ) -> Result<(), NetworkError> {
        if let Access::Stall = self.access(peer)? {
            std::future::pending::<()>().await;
        }
        self.store(peer, id, data);
        Ok(())
    }

    async fn request_blob(&self, peer: &PeerId, id: &ContentId) -> Result<Option<Bytes>, NetworkError> {
        if let Access::Stall = self.access(peer)? {
            std::future::pending::<()>().await;
        }
        Ok(self
            .state()
            .blobs
            .get(peer)
            .and_then(|blobs| blobs.get(id))
            .cloned())
    }

    async fn on_file_added(&self, metadata: &FileMetadata) -> Result<(), NetworkError> {
        let mut state = self.state();
        if state.fail_broadcasts {
            return Err(NetworkError::Transport("broadcast refused".into()));
        }
        state.added.push(metadata.content_id.clone());
        Ok(())
    }

    async fn on_file_deleted(&self, id: &ContentId) -> Result<(), NetworkError> {
        let mut state = self.state();
        if state.fail_broadcasts {
            return Err(NetworkError::Transport("broadcast refused".into()));
        }
        state.deleted.push(id.clone());
        Ok(())
    }
}
