//! In-memory metadata index.
//!
//! The single authority on which content the engine holds. Everything else
//! (tiers, ledger, sweep) reads and writes records through these methods.
//! Iteration order is unspecified and may differ after a reload.

use std::collections::HashMap;

use cairn_shared::{ContentId, FileMetadata};

#[derive(Debug, Default, Clone)]
pub struct MetadataIndex {
    entries: HashMap<ContentId, FileMetadata>,
}

impl MetadataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record keyed by its content id. Returns the
    /// previous record, if any.
    pub fn upsert(&mut self, metadata: FileMetadata) -> Option<FileMetadata> {
        self.entries.insert(metadata.content_id.clone(), metadata)
    }

    pub fn get(&self, id: &ContentId) -> Option<&FileMetadata> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn remove(&mut self, id: &ContentId) -> Option<FileMetadata> {
        self.entries.remove(id)
    }

    pub fn all(&self) -> Vec<FileMetadata> {
        self.entries.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<ContentId> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileMetadata> {
        self.entries.values()
    }

    pub fn find<P>(&self, predicate: P) -> Vec<FileMetadata>
    where
        P: Fn(&FileMetadata) -> bool,
    {
        self.entries
            .values()
            .filter(|meta| predicate(meta))
            .cloned()
            .collect()
    }

    /// Case-insensitive substring match on the file name or the content id.
    /// A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<FileMetadata> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.find(|meta| {
            meta.name.to_lowercase().contains(&needle) || meta.content_id.as_str().contains(&needle)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use cairn_shared::{hashing, PeerId};

    use super::*;

    fn record(bytes: &[u8], name: &str) -> FileMetadata {
        let id = hashing::hash(bytes).unwrap();
        FileMetadata::new(id, name, "application/octet-stream", bytes.len() as u64, PeerId::from("me"))
    }

    #[test]
    fn test_upsert_is_keyed_by_content_id() {
        let mut index = MetadataIndex::new();
        let first = record(b"same", "first.txt");
        let mut second = record(b"same", "second.txt");
        second.id = first.id;

        assert!(index.upsert(first.clone()).is_none());
        assert_eq!(index.upsert(second.clone()), Some(first));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&second.content_id).unwrap().name, "second.txt");
    }

    #[test]
    fn test_remove() {
        let mut index = MetadataIndex::new();
        let meta = record(b"x", "x.bin");
        index.upsert(meta.clone());

        assert_eq!(index.remove(&meta.content_id), Some(meta.clone()));
        assert!(index.remove(&meta.content_id).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_search_by_name_case_insensitive() {
        let mut index = MetadataIndex::new();
        index.upsert(record(b"1", "Quarterly-Report.PDF"));
        index.upsert(record(b"2", "holiday.jpg"));

        let hits = index.search("report");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Quarterly-Report.PDF");
        assert!(index.search("xyz").is_empty());
        assert!(index.search("   ").is_empty());
    }

    #[test]
    fn test_search_by_content_id() {
        let mut index = MetadataIndex::new();
        let meta = record(b"needle", "n.bin");
        index.upsert(meta.clone());
        index.upsert(record(b"hay", "h.bin"));

        let prefix = meta.content_id.as_str()[..10].to_uppercase();
        let hits = index.search(&prefix);
        assert_eq!(hits, vec![meta.clone()]);
        assert_eq!(index.search(meta.content_id.as_str()), vec![meta]);
    }

    #[test]
    fn test_find_predicate() {
        let mut index = MetadataIndex::new();
        let mut public = record(b"pub", "pub.txt");
        public.indexed = true;
        index.upsert(public.clone());
        index.upsert(record(b"priv", "priv.txt"));

        assert_eq!(index.find(|m| m.indexed), vec![public]);
        assert_eq!(index.find(|_| true).len(), 2);
    }
}
