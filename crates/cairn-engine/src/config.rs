//! Engine configuration loaded from environment variables.
//!
//! All settings have sensible defaults so an engine can be opened with zero
//! configuration for local use.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use cairn_shared::constants::{
    APP_NAME, DEFAULT_CACHE_MAX_BYTES, DEFAULT_CAPACITY_GB, DEFAULT_FLAT_MAX_BLOB, DEFAULT_PEER_TIMEOUT_SECS,
    DEFAULT_PRICE_PER_GB, DEFAULT_REPLICATION_FACTOR, HEARTBEAT_CHECK_INTERVAL_SECS,
    HEARTBEAT_TIMEOUT_SECS, MAX_RECOVERY_RETRIES,
};
use cairn_shared::PeerId;
use cairn_store::TierConfig;
use directories::ProjectDirs;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of the durable tiers (SQLite file and flat directory).
    /// Env: `CAIRN_DATA_DIR`
    /// Default: the platform data directory, e.g. `~/.local/share/cairn`.
    pub data_dir: PathBuf,

    /// Identity of this peer. When unset, the persisted one is reused or a
    /// fresh one is generated on first open.
    /// Env: `CAIRN_PEER_ID`
    pub peer_id: Option<PeerId>,

    /// Storage capacity used until the user sets one explicitly.
    /// Env: `CAIRN_CAPACITY_GB`
    pub capacity_gb: f64,

    /// Monthly price per provisioned GB.
    /// Env: `CAIRN_PRICE_PER_GB`
    pub price_per_gb: f64,

    /// Byte budget of the volatile cache.
    /// Env: `CAIRN_CACHE_MAX_BYTES`
    pub cache_max_bytes: usize,

    /// Largest blob the flat tier accepts.
    /// Env: `CAIRN_FLAT_MAX_BLOB`
    pub flat_max_blob: usize,

    /// Bound on every individual remote peer call.
    /// Env: `CAIRN_PEER_TIMEOUT_SECS`
    pub peer_timeout: Duration,

    /// How many connected peers a new ingest is offered to.
    /// Env: `CAIRN_REPLICATION_FACTOR`
    pub replication_factor: usize,

    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub max_recovery_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            peer_id: None,
            capacity_gb: DEFAULT_CAPACITY_GB,
            price_per_gb: DEFAULT_PRICE_PER_GB,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
            flat_max_blob: DEFAULT_FLAT_MAX_BLOB,
            peer_timeout: Duration::from_secs(DEFAULT_PEER_TIMEOUT_SECS),
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            heartbeat_interval: Duration::from_secs(HEARTBEAT_CHECK_INTERVAL_SECS),
            heartbeat_timeout: Duration::from_secs(HEARTBEAT_TIMEOUT_SECS),
            max_recovery_retries: MAX_RECOVERY_RETRIES,
        }
    }
}

impl EngineConfig {
    /// Defaults rooted at an explicit directory.
    pub fn for_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("CAIRN_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        if let Ok(id) = std::env::var("CAIRN_PEER_ID") {
            if !id.trim().is_empty() {
                config.peer_id = Some(PeerId::new(id.trim()));
            }
        }

        if let Some(gb) = parse_env::<f64>("CAIRN_CAPACITY_GB") {
            if gb.is_finite() && gb >= 0.0 {
                config.capacity_gb = gb;
            } else {
                tracing::warn!(value = gb, "Invalid CAIRN_CAPACITY_GB, using default");
            }
        }

        if let Some(price) = parse_env::<f64>("CAIRN_PRICE_PER_GB") {
            config.price_per_gb = price;
        }

        if let Some(bytes) = parse_env::<usize>("CAIRN_CACHE_MAX_BYTES") {
            config.cache_max_bytes = bytes;
        }

        if let Some(bytes) = parse_env::<usize>("CAIRN_FLAT_MAX_BLOB") {
            config.flat_max_blob = bytes;
        }

        if let Some(secs) = parse_env::<u64>("CAIRN_PEER_TIMEOUT_SECS") {
            config.peer_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(n) = parse_env::<usize>("CAIRN_REPLICATION_FACTOR") {
            config.replication_factor = n;
        }

        config
    }

    pub fn tier_config(&self) -> TierConfig {
        TierConfig {
            root: self.data_dir.clone(),
            cache_max_bytes: self.cache_max_bytes,
            flat_max_blob: self.flat_max_blob,
        }
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("org", APP_NAME, APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./cairn-data"))
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}
