//! v001 -- Initial schema creation.
//!
//! Creates the three tier-2 tables: `file_metadata`, `blobs` and `settings`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- File metadata (one JSON record per content id)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS file_metadata (
    content_id    TEXT PRIMARY KEY NOT NULL,  -- hex BLAKE3 digest
    record        TEXT NOT NULL,              -- serialized FileMetadata
    last_modified TEXT NOT NULL               -- RFC-3339, for merge on load
);

-- ----------------------------------------------------------------
-- Blobs (possibly ciphered bytes)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blobs (
    content_id TEXT PRIMARY KEY NOT NULL,
    data       BLOB NOT NULL,
    size       INTEGER NOT NULL
);

-- ----------------------------------------------------------------
-- Small scalar settings (capacity, local peer id)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
