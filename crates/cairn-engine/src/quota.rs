//! Quota accounting.
//!
//! Always recomputed from a full index snapshot; there is no running total
//! to drift after deletes, recoveries or evictions.

use cairn_shared::StorageQuota;

use crate::index::MetadataIndex;

/// Sum of plaintext sizes over valid records.
pub fn used_bytes(index: &MetadataIndex) -> u64 {
    index
        .iter()
        .filter(|meta| meta.is_valid)
        .map(|meta| meta.size)
        .sum()
}

pub fn recompute(index: &MetadataIndex, total_capacity_gb: f64, unit_price: f64) -> StorageQuota {
    let used_gb = StorageQuota::bytes_to_gb(used_bytes(index));
    StorageQuota {
        total_capacity_gb,
        used_gb,
        available_gb: (total_capacity_gb - used_gb).max(0.0),
        monthly_cost: total_capacity_gb * unit_price,
    }
}
