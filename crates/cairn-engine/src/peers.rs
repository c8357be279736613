//! Peer liveness tracking.
//!
//! Keeps one [`PeerInfo`] per remote peer ever seen. Peers are never removed,
//! only flipped to disconnected when the network collaborator stops calling
//! [`PeerDirectory::mark_online`] for longer than the heartbeat timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cairn_shared::{PeerId, PeerInfo};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle shared between the engine and the heartbeat task.
pub type SharedPeerDirectory = Arc<Mutex<PeerDirectory>>;

/// Lock a shared directory, recovering from a poisoned mutex.
pub fn lock_directory(directory: &SharedPeerDirectory) -> MutexGuard<'_, PeerDirectory> {
    directory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tracks every known peer.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    peers: HashMap<PeerId, PeerInfo>,
    timeout: Duration,
}

impl PeerDirectory {
    pub fn new(timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            timeout,
        }
    }

    pub fn shared(timeout: Duration) -> SharedPeerDirectory {
        Arc::new(Mutex::new(Self::new(timeout)))
    }

    /// Record a heartbeat. Creates the peer on first contact.
    ///
    /// Returns `true` if the peer was new or came back from disconnected.
    pub fn mark_online(&mut self, peer_id: &PeerId, now: DateTime<Utc>) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(info) => {
                let came_back = !info.is_connected;
                info.is_connected = true;
                if now > info.last_seen {
                    info.last_seen = now;
                }
                if came_back {
                    debug!(peer = %peer_id, "Peer back online");
                }
                came_back
            }
            None => {
                debug!(peer = %peer_id, "Tracking new peer");
                self.peers.insert(peer_id.clone(), PeerInfo::new(peer_id.clone(), now));
                true
            }
        }
    }

    /// Merge a peer as reported by the collaborator's peer list. Storage
    /// figures are taken as-is; liveness only moves forward.
    pub fn merge(&mut self, reported: PeerInfo) {
        match self.peers.get_mut(&reported.peer_id) {
            Some(info) => {
                info.files_count = reported.files_count;
                info.storage_used = reported.storage_used;
                if reported.is_connected && reported.last_seen >= info.last_seen {
                    info.last_seen = reported.last_seen;
                    info.is_connected = true;
                }
            }
            None => {
                self.peers.insert(reported.peer_id.clone(), reported);
            }
        }
    }

    /// Mark peers silent for longer than the timeout as disconnected.
    ///
    /// Returns the peers that flipped on this pass.
    pub fn check_heartbeats(&mut self, now: DateTime<Utc>) -> Vec<PeerId> {
        let mut expired = Vec::new();
        for info in self.peers.values_mut() {
            // A last_seen in the future (clock skew) converts to Err: not silent.
            let silent = now
                .signed_duration_since(info.last_seen)
                .to_std()
                .map(|elapsed| elapsed > self.timeout)
                .unwrap_or(false);
            if info.is_connected && silent {
                info.is_connected = false;
                expired.push(info.peer_id.clone());
            }
        }
        expired
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerInfo> {
        self.peers.get(peer_id)
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.peers.get(peer_id).map(|p| p.is_connected).unwrap_or(false)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .peers
            .values()
            .filter(|info| info.is_connected)
            .map(|info| info.peer_id.clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|info| info.is_connected).count()
    }

    /// Snapshot of every known peer.
    pub fn all(&self) -> Vec<PeerInfo> {
        self.peers.values().cloned().collect()
    }
}

/// Background task flipping silent peers to disconnected.
pub struct HeartbeatMonitor {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// Spawn the heartbeat check loop on the current tokio runtime.
pub fn spawn_heartbeat_monitor(directory: SharedPeerDirectory, interval: Duration) -> HeartbeatMonitor {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let expired = lock_directory(&directory).check_heartbeats(Utc::now());
                    for peer in expired {
                        info!(peer = %peer, "Peer heartbeat timed out, marked offline");
                    }
                }
                _ = &mut shutdown_rx => {
                    debug!("Heartbeat monitor stopping");
                    break;
                }
            }
        }
    });

    HeartbeatMonitor { shutdown_tx, handle }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str) -> PeerId {
        PeerId::from(name)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_first_contact_creates_peer() {
        let mut dir = PeerDirectory::new(Duration::from_secs(30));
        let p = peer("a");

        assert!(!dir.is_connected(&p));
        assert!(dir.mark_online(&p, at(0)));
        assert!(dir.is_connected(&p));
        assert_eq!(dir.peer_count(), 1);

        // Second heartbeat is not a transition.
        assert!(!dir.mark_online(&p, at(5)));
        assert_eq!(dir.get(&p).unwrap().last_seen, at(5));
    }

    #[test]
    fn test_timeout_marks_offline_but_keeps_peer() {
        let mut dir = PeerDirectory::new(Duration::from_secs(30));
        let p = peer("a");
        dir.mark_online(&p, at(0));

        assert!(dir.check_heartbeats(at(30)).is_empty());
        assert_eq!(dir.check_heartbeats(at(31)), vec![p.clone()]);
        assert!(!dir.is_connected(&p));
        assert_eq!(dir.peer_count(), 1);

        // Already offline: not reported again.
        assert!(dir.check_heartbeats(at(100)).is_empty());

        assert!(dir.mark_online(&p, at(101)));
        assert!(dir.is_connected(&p));
    }

    #[test]
    fn test_connected_peers_list() {
        let mut dir = PeerDirectory::new(Duration::from_secs(30));
        dir.mark_online(&peer("b"), at(0));
        dir.mark_online(&peer("a"), at(20));

        dir.check_heartbeats(at(40));
        assert_eq!(dir.connected_peers(), vec![peer("a")]);
        assert_eq!(dir.connected_count(), 1);
        assert_eq!(dir.all().len(), 2);
    }

    #[test]
    fn test_merge_reported_stats() {
        let mut dir = PeerDirectory::new(Duration::from_secs(30));
        dir.mark_online(&peer("a"), at(10));

        let mut reported = PeerInfo::new(peer("a"), at(5));
        reported.files_count = 7;
        reported.storage_used = 4096;
        dir.merge(reported);

        let info = dir.get(&peer("a")).unwrap();
        assert_eq!(info.files_count, 7);
        assert_eq!(info.storage_used, 4096);
        // Older report does not move liveness backwards.
        assert_eq!(info.last_seen, at(10));

        let mut fresh = PeerInfo::new(peer("c"), at(0));
        fresh.is_connected = false;
        dir.merge(fresh);
        assert!(!dir.is_connected(&peer("c")));
    }

    #[tokio::test]
    async fn test_monitor_flips_stale_peers() {
        let directory = PeerDirectory::shared(Duration::from_secs(30));
        let stale = peer("stale");
        let fresh = peer("fresh");
        {
            let mut dir = lock_directory(&directory);
            dir.mark_online(&stale, Utc::now() - chrono::Duration::seconds(60));
            dir.mark_online(&fresh, Utc::now());
        }

        let monitor = spawn_heartbeat_monitor(directory.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.shutdown().await;

        let dir = lock_directory(&directory);
        assert!(!dir.is_connected(&stale));
        assert!(dir.is_connected(&fresh));
    }
}
