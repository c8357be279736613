use cairn_shared::{ContentId, FileMetadata};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    // ------------------------------------------------------------------
    // Blobs
    // ------------------------------------------------------------------

    pub fn put_blob(&self, id: &ContentId, data: &[u8]) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO blobs (content_id, data, size) VALUES (?1, ?2, ?3)",
            params![id.as_str(), data, data.len() as i64],
        )?;
        Ok(())
    }

    pub fn get_blob(&self, id: &ContentId) -> Result<Option<Vec<u8>>> {
        let data = self
            .conn()
            .query_row(
                "SELECT data FROM blobs WHERE content_id = ?1",
                params![id.as_str()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }

    pub fn has_blob(&self, id: &ContentId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM blobs WHERE content_id = ?1",
                params![id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Returns `true` if a row was deleted.
    pub fn delete_blob(&self, id: &ContentId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM blobs WHERE content_id = ?1", params![id.as_str()])?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub fn put_metadata(&self, meta: &FileMetadata) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO file_metadata (content_id, record, last_modified)
             VALUES (?1, ?2, ?3)",
            params![
                meta.content_id.as_str(),
                meta.to_json()?,
                meta.last_modified.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All persisted records. Rows that fail to decode are skipped with a
    /// warning; one bad row must not hide the rest of the index.
    pub fn list_metadata(&self) -> Result<Vec<FileMetadata>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT content_id, record FROM file_metadata")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (content_id, record) = row?;
            match FileMetadata::from_json(&record) {
                Ok(meta) => records.push(meta),
                Err(e) => {
                    tracing::warn!(%content_id, error = %e, "skipping undecodable metadata row");
                }
            }
        }
        Ok(records)
    }

    pub fn delete_metadata(&self, id: &ContentId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM file_metadata WHERE content_id = ?1",
            params![id.as_str()],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}
