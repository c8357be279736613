//! Validator and recovery sweep.
//!
//! A record whose blob is gone from the volatile cache is looked up in the
//! durable tiers. Found: the cache is backfilled if it has room and the
//! record is valid again. Not found: the record is marked invalid and its
//! retry counter bumped; once the counter reaches the budget the record is
//! evicted.
//!
//! Only records whose state changed are persisted and reported; a valid
//! record still held by a durable tier counts as healthy.

use cairn_shared::{crypto, ContentId, FileMetadata};
use cairn_store::{Tier, TieredStore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::index::MetadataIndex;

/// What one sweep did.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub healthy: usize,
    /// Previously invalid or retried, found again.
    pub recovered: Vec<ContentId>,
    /// Still missing, retry budget not exhausted.
    pub pending: Vec<ContentId>,
    /// Removed from the index. Full records so callers can tell which ones
    /// were advertised.
    pub evicted: Vec<FileMetadata>,
}

impl SweepReport {
    pub fn evicted_ids(&self) -> Vec<ContentId> {
        self.evicted.iter().map(|meta| meta.content_id.clone()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.recovered.is_empty() && self.pending.is_empty() && self.evicted.is_empty()
    }
}

enum Verdict {
    Healthy,
    Recovered,
    Pending,
    Evicted,
}

/// Check every record in `index` once. Changed records are persisted to the
/// durable tiers; evicted ones are removed from the index and the tiers.
pub async fn sweep(index: &mut MetadataIndex, tiers: &TieredStore, max_retries: u32) -> SweepReport {
    let mut report = SweepReport::default();

    for id in index.ids() {
        let Some(mut meta) = index.get(&id).cloned() else {
            continue;
        };
        report.checked += 1;

        let verdict = check_record(&mut meta, tiers, max_retries).await;
        match verdict {
            Verdict::Healthy => {
                report.healthy += 1;
                continue;
            }
            Verdict::Recovered => {
                info!(content_id = %id, "blob recovered");
                tiers.save_metadata(&meta).await;
                index.upsert(meta);
                report.recovered.push(id);
            }
            Verdict::Pending => {
                warn!(content_id = %id, retry_count = meta.retry_count, "blob missing from every tier");
                tiers.save_metadata(&meta).await;
                index.upsert(meta);
                report.pending.push(id);
            }
            Verdict::Evicted => {
                warn!(content_id = %id, name = %meta.name, "evicting unrecoverable record");
                index.remove(&id);
                tiers.delete_metadata(&id).await;
                tiers.delete(&id).await;
                report.evicted.push(meta);
            }
        }
    }

    debug!(
        checked = report.checked,
        healthy = report.healthy,
        recovered = report.recovered.len(),
        pending = report.pending.len(),
        evicted = report.evicted.len(),
        "sweep finished"
    );
    report
}

async fn check_record(meta: &mut FileMetadata, tiers: &TieredStore, max_retries: u32) -> Verdict {
    let id = meta.content_id.clone();

    let found = if tiers.contains(Tier::Cache, &id).await {
        true
    } else if tiers.contains(Tier::Transactional, &id).await || tiers.contains(Tier::Flat, &id).await {
        backfill(meta, tiers).await;
        true
    } else {
        false
    };

    if found {
        return if mark_valid(meta) {
            Verdict::Recovered
        } else {
            Verdict::Healthy
        };
    }

    meta.is_valid = false;
    meta.retry_count = meta.retry_count.saturating_add(1);
    if meta.retry_count >= max_retries {
        Verdict::Evicted
    } else {
        Verdict::Pending
    }
}

/// Read the blob through the tiers, which refills the cache, unless the
/// cache has no room for it.
async fn backfill(meta: &FileMetadata, tiers: &TieredStore) {
    let cache = tiers.cache();
    let stored_len = if meta.is_encrypted {
        crypto::wrapped_len(meta.size as usize)
    } else {
        meta.size as usize
    };
    if cache.used_bytes().saturating_add(stored_len) > cache.budget() {
        debug!(content_id = %meta.content_id, size = stored_len, "cache full, backfill skipped");
        return;
    }
    if let Some(blob) = tiers.get(&meta.content_id).await {
        debug!(content_id = %meta.content_id, tier = %blob.tier(), "cache backfilled");
    }
}

/// Returns whether anything changed.
fn mark_valid(meta: &mut FileMetadata) -> bool {
    let changed = !meta.is_valid || meta.retry_count != 0;
    meta.is_valid = true;
    meta.retry_count = 0;
    changed
}
