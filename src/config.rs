//! Compile-time configuration: every tunable named in the allocator's
//! external contract, gathered in one place so the rest of the crate never
//! repeats a magic number.

use std::time::Duration;

/// Bytes reserved per heap at `init`: the global reservation is
/// `HEAP_BYTES * thread_count`, and each worker's local reservation is one
/// `HEAP_BYTES` slice.
pub const HEAP_BYTES: usize = 1_048_576;

/// Local-heap split threshold (`SIZE` in the original source): a free
/// extent found on a local heap is split only if the remainder after
/// carving off `want` bytes is at least this large.
pub const LOCAL_SPLIT_THRESHOLD: usize = 256;

/// Global-heap split threshold (`GSIZE`): larger than the local threshold
/// to reduce fragmentation of the shared free list, which is refilled far
/// less often than a local one.
pub const GLOBAL_SPLIT_THRESHOLD: usize = 1024;

/// Every allocation request is rounded up to a multiple of this many bytes
/// before a fit is searched for.
pub const ALLOC_ALIGN: usize = 64;

/// How often the background reclaimer wakes up.
pub const RECLAIM_TICK: Duration = Duration::from_secs(1);

/// Age threshold for the age-based reclaim policy: an extent idle longer
/// than this is a migration candidate. Unused by the default (coin-flip)
/// policy.
pub const MAX_UNUSED_SECONDS: u64 = 30;

/// Initial `transfer_batch` size for a freshly registered local heap.
pub const INITIAL_TRANSFER_BATCH: usize = 4;

/// Amount `transfer_batch` grows by after each successful batch migration.
pub const TRANSFER_BATCH_GROWTH: usize = 2;

/// Upper bound on the per-tick reclaim/release counts drawn by the
/// coin-flip policy (`rand() % 3 + 1` in the original source).
pub const MAX_BLOCKS_PER_TICK: u32 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_ordered() {
        assert!(LOCAL_SPLIT_THRESHOLD < GLOBAL_SPLIT_THRESHOLD);
        assert!(GLOBAL_SPLIT_THRESHOLD < HEAP_BYTES);
    }

    #[test]
    fn alloc_align_is_power_of_two() {
        assert!(ALLOC_ALIGN.is_power_of_two());
    }
}
