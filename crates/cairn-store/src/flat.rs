//! Tier 3: the flat durable key-value store.
//!
//! One file per key under a root directory:
//!
//! ```text
//! <root>/blobs/<content_id>
//! <root>/meta/<content_id>.json
//! <root>/settings/<key>
//! ```
//!
//! Writes go to a temporary sibling and are renamed into place so a crash
//! never leaves a half-written blob under its final name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use cairn_shared::{ContentId, FileMetadata};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

const BLOBS_DIR: &str = "blobs";
const META_DIR: &str = "meta";
const SETTINGS_DIR: &str = "settings";

#[derive(Debug, Clone)]
pub struct FlatStore {
    base_path: PathBuf,
    max_size: usize,
}

impl FlatStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self> {
        for dir in [BLOBS_DIR, META_DIR, SETTINGS_DIR] {
            fs::create_dir_all(base_path.join(dir)).await?;
        }

        info!(path = %base_path.display(), max_size, "Flat store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    // ------------------------------------------------------------------
    // Blobs
    // ------------------------------------------------------------------

    pub async fn put(&self, id: &ContentId, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(StoreError::EmptyBlob);
        }
        if data.len() > self.max_size {
            return Err(StoreError::BlobTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        write_atomic(&self.blob_path(id), data).await?;
        debug!(content_id = %id, size = data.len(), "Stored flat blob");
        Ok(())
    }

    pub async fn get(&self, id: &ContentId) -> Result<Option<Vec<u8>>> {
        read_optional(&self.blob_path(id)).await
    }

    pub async fn contains(&self, id: &ContentId) -> Result<bool> {
        Ok(fs::try_exists(self.blob_path(id)).await?)
    }

    pub async fn delete(&self, id: &ContentId) -> Result<()> {
        remove_optional(&self.blob_path(id)).await
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub async fn put_metadata(&self, meta: &FileMetadata) -> Result<()> {
        let json = meta.to_json()?;
        write_atomic(&self.meta_path(&meta.content_id), json.as_bytes()).await
    }

    pub async fn list_metadata(&self) -> Result<Vec<FileMetadata>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(self.base_path.join(META_DIR)).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable metadata file");
                    continue;
                }
            };
            match FileMetadata::from_json(&raw) {
                Ok(meta) => records.push(meta),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping undecodable metadata file"),
            }
        }

        Ok(records)
    }

    pub async fn delete_metadata(&self, id: &ContentId) -> Result<()> {
        remove_optional(&self.meta_path(id)).await
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        write_atomic(&self.setting_path(key)?, value.as_bytes()).await
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let raw = read_optional(&self.setting_path(key)?).await?;
        Ok(raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    // Content ids are validated hex, so they can't escape the root.
    fn blob_path(&self, id: &ContentId) -> PathBuf {
        self.base_path.join(BLOBS_DIR).join(id.as_str())
    }

    fn meta_path(&self, id: &ContentId) -> PathBuf {
        self.base_path.join(META_DIR).join(format!("{id}.json"))
    }

    fn setting_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(SETTINGS_DIR).join(key))
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_optional(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
