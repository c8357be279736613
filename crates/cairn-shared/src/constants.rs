/// Application name
pub const APP_NAME: &str = "Cairn";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Random salt prepended to every passphrase envelope
pub const SALT_SIZE: usize = 16;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Length in bytes of the index checksum and of passphrase fingerprints
pub const DIGEST_SIZE: usize = 16;

/// Bytes per gibibyte, the unit quota figures are expressed in
pub const BYTES_PER_GB: f64 = 1_073_741_824.0;

/// Recovery attempts before an unrecoverable record is evicted
pub const MAX_RECOVERY_RETRIES: u32 = 3;

/// Peers silent for longer than this are marked disconnected
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// How often the heartbeat monitor checks for silent peers
pub const HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 10;

/// Default ceiling for blobs accepted by the flat key-value tier (10 MiB)
pub const DEFAULT_FLAT_MAX_BLOB: usize = 10 * 1024 * 1024;

/// Default byte budget of the volatile cache tier (512 MiB)
pub const DEFAULT_CACHE_MAX_BYTES: usize = 512 * 1024 * 1024;

/// Default user-set storage capacity
pub const DEFAULT_CAPACITY_GB: f64 = 10.0;

/// Default monthly price per provisioned GB
pub const DEFAULT_PRICE_PER_GB: f64 = 0.05;

/// Default per-peer timeout for remote calls
pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 5;

/// Default number of remote peers an ingest is offered to
pub const DEFAULT_REPLICATION_FACTOR: usize = 3;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_INDEX_CHECKSUM: &str = "cairn-index-checksum-v1";
pub const KDF_CONTEXT_ENVELOPE_KEY: &str = "cairn-envelope-key-v1";
pub const KDF_CONTEXT_KEY_FINGERPRINT: &str = "cairn-key-fingerprint-v1";
