// Content-addressed storage engine: index, quota, replication ledger,
// recovery sweep and peer liveness on top of the tiered store.

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod ledger;
pub mod network;
pub mod peers;
pub mod quota;
pub mod recovery;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::EngineConfig;
pub use engine::{EngineStats, IngestOutcome, IngestRequest, StorageEngine};
pub use error::{EngineError, NetworkError, Result};
pub use index::MetadataIndex;
pub use ledger::{RemoteFetch, ReplicationLedger};
pub use network::{LogOnlyNetwork, Network};
pub use peers::{spawn_heartbeat_monitor, HeartbeatMonitor, PeerDirectory, SharedPeerDirectory};
pub use recovery::SweepReport;
