//! Allocation statistics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only and not
//! used as synchronization primitives. The allocator's own spinlocks provide
//! the ordering guarantees for correctness; these counters are purely for
//! monitoring.
//!
//! # Usage
//!
//! ```ignore
//! let snap = rtmalloc::stats::snapshot();
//! println!("allocs: {}", snap.alloc_count);
//! ```
//!
//! Obtain a [`Snapshot`] with [`snapshot()`]. Individual counter loads are
//! individually atomic but not globally consistent with each other.

use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    /// Total calls to `allocate` with size > 0.
    pub alloc_count: AtomicU64,
    /// Total calls to `free` that reached a used-list match.
    pub dealloc_count: AtomicU64,
    /// Sum of all requested byte sizes passed to `allocate` (pre-rounding).
    pub alloc_bytes: AtomicU64,

    /// Allocations satisfied on the Tier 1 fast path (local lock only).
    pub local_hits: AtomicU64,
    /// Allocations satisfied on the Tier 2 path, after a global migration.
    pub global_hits: AtomicU64,
    /// Allocations that escaped to the OS allocator on Tier 3.
    pub os_fallbacks: AtomicU64,

    /// Times a local free extent was split to satisfy a request.
    pub local_splits: AtomicU64,
    /// Times a global free extent was split during Tier 2 migration.
    pub global_splits: AtomicU64,
    /// Times an exact/near-exact fit was returned without touching the
    /// used list (the no-split quirk preserved from the source).
    pub no_split_allocs: AtomicU64,

    /// Extents migrated from a local heap to the global heap by the
    /// background reclaimer.
    pub reclaimed_to_global: AtomicU64,
    /// Extents released from the global heap back to the OS by the
    /// background reclaimer.
    pub released_to_os: AtomicU64,

    /// Frees that found no matching descriptor on any tracked used list
    /// (invalid frees and frees of never-tracked no-split allocations).
    pub invalid_frees: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicU64::new(0),
            dealloc_count: AtomicU64::new(0),
            alloc_bytes: AtomicU64::new(0),
            local_hits: AtomicU64::new(0),
            global_hits: AtomicU64::new(0),
            os_fallbacks: AtomicU64::new(0),
            local_splits: AtomicU64::new(0),
            global_splits: AtomicU64::new(0),
            no_split_allocs: AtomicU64::new(0),
            reclaimed_to_global: AtomicU64::new(0),
            released_to_os: AtomicU64::new(0),
            invalid_frees: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time snapshot of all allocation statistics.
///
/// Fields are plain `u64` values loaded from the global atomic counters.
/// Individual fields are each atomically read, but the snapshot as a whole
/// is not globally consistent — concurrent allocations may race between loads.
/// For monitoring purposes this is always sufficient.
///
/// Obtain a snapshot with [`snapshot()`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub alloc_count: u64,
    pub dealloc_count: u64,
    pub alloc_bytes: u64,
    pub local_hits: u64,
    pub global_hits: u64,
    pub os_fallbacks: u64,
    pub local_splits: u64,
    pub global_splits: u64,
    pub no_split_allocs: u64,
    pub reclaimed_to_global: u64,
    pub released_to_os: u64,
    pub invalid_frees: u64,
}

/// Load all counters with `Relaxed` ordering and return a [`Snapshot`].
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        alloc_count: s.alloc_count.load(Ordering::Relaxed),
        dealloc_count: s.dealloc_count.load(Ordering::Relaxed),
        alloc_bytes: s.alloc_bytes.load(Ordering::Relaxed),
        local_hits: s.local_hits.load(Ordering::Relaxed),
        global_hits: s.global_hits.load(Ordering::Relaxed),
        os_fallbacks: s.os_fallbacks.load(Ordering::Relaxed),
        local_splits: s.local_splits.load(Ordering::Relaxed),
        global_splits: s.global_splits.load(Ordering::Relaxed),
        no_split_allocs: s.no_split_allocs.load(Ordering::Relaxed),
        reclaimed_to_global: s.reclaimed_to_global.load(Ordering::Relaxed),
        released_to_os: s.released_to_os.load(Ordering::Relaxed),
        invalid_frees: s.invalid_frees.load(Ordering::Relaxed),
    }
}

#[cfg(all(test, feature = "stats"))]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counter_state() {
        STATS.alloc_count.fetch_add(1, Ordering::Relaxed);
        let snap = snapshot();
        assert!(snap.alloc_count >= 1);
    }
}
