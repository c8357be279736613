//! Tier 2: the durable transactional store.
//!
//! SQLite is synchronous, so every call is shipped to tokio's blocking pool.
//! That keeps the suspension point of the caller exactly at the tier I/O.

use std::path::Path;
use std::sync::{Arc, Mutex};

use cairn_shared::{ContentId, FileMetadata};

use crate::database::Database;
use crate::error::Result;

#[derive(Clone)]
pub struct TransactionalTier {
    db: Arc<Mutex<Database>>,
}

impl TransactionalTier {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&guard)
        })
        .await?
    }

    pub async fn put(&self, id: &ContentId, data: Vec<u8>) -> Result<()> {
        let id = id.clone();
        self.with_db(move |db| db.put_blob(&id, &data)).await
    }

    pub async fn get(&self, id: &ContentId) -> Result<Option<Vec<u8>>> {
        let id = id.clone();
        self.with_db(move |db| db.get_blob(&id)).await
    }

    pub async fn contains(&self, id: &ContentId) -> Result<bool> {
        let id = id.clone();
        self.with_db(move |db| db.has_blob(&id)).await
    }

    pub async fn delete(&self, id: &ContentId) -> Result<()> {
        let id = id.clone();
        self.with_db(move |db| db.delete_blob(&id).map(|_| ())).await
    }

    pub async fn put_metadata(&self, meta: &FileMetadata) -> Result<()> {
        let meta = meta.clone();
        self.with_db(move |db| db.put_metadata(&meta)).await
    }

    pub async fn list_metadata(&self) -> Result<Vec<FileMetadata>> {
        self.with_db(|db| db.list_metadata()).await
    }

    pub async fn delete_metadata(&self, id: &ContentId) -> Result<()> {
        let id = id.clone();
        self.with_db(move |db| db.delete_metadata(&id).map(|_| ())).await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_db(move |db| db.set_setting(&key, &value)).await
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_db(move |db| db.get_setting(&key)).await
    }
}
