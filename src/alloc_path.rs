//! The allocate path: local fast path, global migration + retry, OS
//! fallback.

use crate::config::{GLOBAL_SPLIT_THRESHOLD, LOCAL_SPLIT_THRESHOLD};
use crate::global::GlobalHeap;
use crate::heap::round_request;
use crate::local::{LocalHeapSlot, Registry};
use crate::platform;
use crate::{stat_add, stat_inc, trace};

/// Serve an allocation request for `size` bytes from the worker at
/// `index` in `registry`, falling back to `global` and finally to the OS.
/// `now` is the caller's current logical tick (see `lifecycle::Allocator`).
pub fn allocate(registry: &Registry, global: &GlobalHeap, index: usize, size: usize, now: u64) -> *mut u8 {
    let want = round_request(size);
    stat_inc!(alloc_count);
    stat_add!(alloc_bytes, size);

    let slot = registry.slot(index);

    if let Some(ptr) = tier1(slot, want, now) {
        stat_inc!(local_hits);
        return ptr;
    }

    migrate_from_global(global, slot, want, now);

    if let Some(ptr) = tier1(slot, want, now) {
        stat_inc!(global_hits);
        return ptr;
    }

    trace!("rtmalloc: tier3 OS fallback for {want} bytes");
    stat_inc!(os_fallbacks);
    unsafe { platform::reserve(want) }
}

/// Tier 1: try to satisfy the request from the local heap alone, under
/// only the local lock.
fn tier1(slot: &LocalHeapSlot, want: usize, now: u64) -> Option<*mut u8> {
    slot.with_locked(|state| {
        let victim = state.heap.find_fit(want)?;
        let (start, used_handle) = state
            .heap
            .allocate_from_heap(victim, want, LOCAL_SPLIT_THRESHOLD, now);
        if used_handle.is_some() {
            stat_inc!(local_splits);
        } else {
            stat_inc!(no_split_allocs);
        }
        Some(start as *mut u8)
    })
}

/// Tier 2: pull free inventory from the global heap into `slot`'s local
/// free list. Two strategies, chosen by whether the local heap's free
/// list was empty going in:
///
/// - Empty: batch-migrate up to `transfer_batch` whole extents (the
///   largest available, since the global free list is sorted descending)
///   and grow `transfer_batch` for next time.
/// - Non-empty but nothing large enough: migrate a single best-fit
///   extent, splitting it in the global heap first if there's enough
///   excess to be worth it.
///
/// Both strategies detach from the global heap and insert into the local
/// heap while still holding the global lock, so a descriptor is never
/// observably ownerless at a lock release (I1) — the global lock is only
/// released after the local insert completes, per the fixed
/// global-before-local order.
fn migrate_from_global(global: &GlobalHeap, slot: &LocalHeapSlot, want: usize, now: u64) {
    global.with_locked(|gheap| {
        let was_empty = gheap.free_head().is_none();
        let local_was_empty = slot.with_locked(|state| state.heap.free_head().is_none());

        if local_was_empty && !was_empty {
            let batch = slot.with_locked(|state| state.transfer_batch);
            let mut migrated = 0usize;
            for _ in 0..batch {
                let Some(victim) = gheap.free_head() else {
                    break;
                };
                gheap.detach_free(victim);
                let d = *gheap.arena.get(victim);
                gheap.arena.take(victim);
                slot.with_locked(|state| {
                    let nd = state.heap.arena.insert(d.start, d.length, now);
                    state.heap.insert_free(nd);
                });
                migrated += 1;
            }
            if migrated > 0 {
                slot.with_locked(|state| {
                    state.transfer_batch += crate::config::TRANSFER_BATCH_GROWTH;
                });
                stat_add!(global_hits, migrated);
                trace!("rtmalloc: batch-migrated {migrated} extents from global");
            }
            return;
        }

        let Some(victim) = gheap.find_fit(want) else {
            return;
        };
        gheap.detach_free(victim);
        let victim_data = *gheap.arena.get(victim);

        let push_len = if victim_data.length >= want + GLOBAL_SPLIT_THRESHOLD {
            let rest_start = victim_data.start + want;
            let rest_len = victim_data.length - want;
            let rest = gheap.arena.insert(rest_start, rest_len, now);
            gheap.insert_free(rest);
            stat_inc!(global_splits);
            want
        } else {
            victim_data.length
        };
        gheap.arena.take(victim);

        slot.with_locked(|state| {
            let nd = state.heap.arena.insert(victim_data.start, push_len, now);
            state.heap.insert_free(nd);
        });
        trace!("rtmalloc: migrated a single {push_len}-byte extent from global");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::GlobalHeap;
    use crate::local::Registry;

    #[test]
    fn tier1_satisfies_request_when_local_has_room() {
        let registry = Registry::new(1);
        registry.seed_all_contiguous(0, 4096, 0);
        let global = GlobalHeap::new(4096, 4096, 0);

        let ptr = allocate(&registry, &global, 0, 1024, 1);
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize, 0);
    }

    #[test]
    fn empty_local_triggers_batch_migration_from_global() {
        let registry = Registry::new(1);
        // Local heap starts with nothing.
        let global = GlobalHeap::new(0, 1_048_576, 0);

        let ptr = allocate(&registry, &global, 0, 1024, 1);
        assert!(!ptr.is_null());

        registry.slot(0).with_locked(|state| {
            assert!(state.transfer_batch > crate::config::INITIAL_TRANSFER_BATCH);
        });
    }

    #[test]
    fn exhausted_heaps_fall_back_to_os() {
        let registry = Registry::new(1);
        registry.seed_all_contiguous(0, 64, 0);
        let global = GlobalHeap::new(64, 64, 0);

        let ptr = allocate(&registry, &global, 0, 1_000_000, 1);
        assert!(!ptr.is_null(), "tier 3 must still succeed via the OS allocator");
    }
}
