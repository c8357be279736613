//! The network collaborator seam.
//!
//! The engine never talks to a transport directly. Whatever carries bytes
//! between peers implements [`Network`]; the engine only asks it who is
//! around, offers and requests blobs, and tells it about adds and deletes.

use async_trait::async_trait;
use bytes::Bytes;
use cairn_shared::{ContentId, FileMetadata, PeerId, PeerInfo};
use tracing::info;

use crate::error::NetworkError;

#[async_trait]
pub trait Network: Send + Sync {
    /// Peers currently believed reachable.
    async fn peer_list(&self) -> Result<Vec<PeerInfo>, NetworkError>;

    /// Offer a blob to `peer`. `Ok` means the peer acknowledged it.
    async fn send_blob(
        &self,
        peer: &PeerId,
        id: &ContentId,
        data: Bytes,
        metadata: &FileMetadata,
    ) -> Result<(), NetworkError>;

    /// Ask `peer` for a blob. `Ok(None)` means the peer says it has none.
    async fn request_blob(&self, peer: &PeerId, id: &ContentId) -> Result<Option<Bytes>, NetworkError>;

    /// Fire-and-forget notice that content was added.
    async fn on_file_added(&self, metadata: &FileMetadata) -> Result<(), NetworkError>;

    /// Fire-and-forget notice that content was deleted.
    async fn on_file_deleted(&self, id: &ContentId) -> Result<(), NetworkError>;
}

/// A collaborator with no transport behind it: broadcasts are only logged,
/// no peers are ever reachable.
#[derive(Debug, Default, Clone)]
pub struct LogOnlyNetwork;

#[async_trait]
impl Network for LogOnlyNetwork {
    async fn peer_list(&self) -> Result<Vec<PeerInfo>, NetworkError> {
        Ok(Vec::new())
    }

    async fn send_blob(
        &self,
        peer: &PeerId,
        _id: &ContentId,
        _data: Bytes,
        _metadata: &FileMetadata,
    ) -> Result<(), NetworkError> {
        Err(NetworkError::Unreachable(peer.clone()))
    }

    async fn request_blob(&self, peer: &PeerId, _id: &ContentId) -> Result<Option<Bytes>, NetworkError> {
        Err(NetworkError::Unreachable(peer.clone()))
    }

    async fn on_file_added(&self, metadata: &FileMetadata) -> Result<(), NetworkError> {
        info!(
            content_id = %metadata.content_id,
            name = %metadata.name,
            size = metadata.size,
            "broadcast: file added"
        );
        Ok(())
    }

    async fn on_file_deleted(&self, id: &ContentId) -> Result<(), NetworkError> {
        info!(content_id = %id, "broadcast: file deleted");
        Ok(())
    }
}
