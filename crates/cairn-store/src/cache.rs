//! Tier 1: the volatile in-process cache.
//!
//! Lives only as long as the process. Holds at most `budget` bytes; a blob
//! that would push the total over the budget is refused rather than evicting
//! anything, because for content that reached no durable tier this cache is
//! the only copy.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use cairn_shared::ContentId;

use crate::error::{Result, StoreError};

#[derive(Default)]
struct CacheInner {
    entries: HashMap<ContentId, Bytes>,
    used: usize,
}

pub struct MemoryCache {
    inner: Mutex<CacheInner>,
    budget: usize,
}

impl MemoryCache {
    pub fn new(budget: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            budget,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put(&self, id: &ContentId, data: Bytes) -> Result<()> {
        let mut inner = self.lock();
        let replaced = inner.entries.get(id).map(Bytes::len).unwrap_or(0);
        let projected = inner.used - replaced + data.len();
        if projected > self.budget {
            return Err(StoreError::CacheFull {
                size: data.len(),
                budget: self.budget - (inner.used - replaced),
            });
        }
        inner.used = projected;
        inner.entries.insert(id.clone(), data);
        Ok(())
    }

    pub fn get(&self, id: &ContentId) -> Option<Bytes> {
        self.lock().entries.get(id).cloned()
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.lock().entries.contains_key(id)
    }

    pub fn remove(&self, id: &ContentId) -> bool {
        let mut inner = self.lock();
        match inner.entries.remove(id) {
            Some(data) => {
                inner.used -= data.len();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn used_bytes(&self) -> usize {
        self.lock().used
    }

    pub fn budget(&self) -> usize {
        self.budget
    }
}
