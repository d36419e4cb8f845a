//! Per-thread local heaps and the registry that hands them out.
//!
//! Workers never declare thread-local storage directly. Instead each
//! worker is assigned a stable index into a `Registry` the first time it
//! touches the allocator, via a `thread_local!` cell holding that index.
//! This replaces the compiler-specific thread-local declarations the
//! redesign calls for with explicit, enumerable data placement — the
//! reclaimer walks the registry by index from a different OS thread
//! entirely.

use std::cell::Cell;
use std::sync::Mutex;

use crate::config::INITIAL_TRANSFER_BATCH;
use crate::heap::Heap;
use crate::sync::SpinMutex;

pub struct LocalState {
    pub heap: Heap,
    pub transfer_batch: usize,
}

/// One worker's local heap, serialized by its own spinlock so the
/// reclaimer can visit it from another OS thread without disturbing the
/// owner's fast path beyond the lock itself.
pub struct LocalHeapSlot {
    state: SpinMutex<LocalState>,
}

impl LocalHeapSlot {
    fn new() -> Self {
        Self {
            state: SpinMutex::new(LocalState {
                heap: Heap::new(),
                transfer_batch: INITIAL_TRANSFER_BATCH,
            }),
        }
    }

    pub fn with_locked<R>(&self, f: impl FnOnce(&mut LocalState) -> R) -> R {
        let mut guard = self.state.lock();
        f(&mut guard)
    }
}

/// Registry of every worker's `LocalHeapSlot`, sized once at `init`.
/// Claiming an index is the only operation protected by a conventional
/// mutex — it happens at most once per OS thread's lifetime, off the hot
/// path.
pub struct Registry {
    slots: Vec<LocalHeapSlot>,
    next_unclaimed: Mutex<usize>,
}

// Keyed by the claiming `Registry`'s own address, not just a bare index:
// a process that runs many sequential `Allocator::init()`/`shutdown()`
// lifecycles on the same OS thread (the common pattern in this crate's own
// tests) will see a fresh `Registry` every time, and a stale index cached
// against a previous, now-dropped `Registry` must never be handed back
// for a different one — especially a smaller one, where it would index
// out of bounds.
thread_local! {
    static REGISTRY_INDEX: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
}

impl Registry {
    pub fn new(thread_count: usize) -> Self {
        let mut slots = Vec::with_capacity(thread_count);
        slots.resize_with(thread_count, LocalHeapSlot::new);
        Self {
            slots,
            next_unclaimed: Mutex::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Seed every slot's local heap with its own backing reservation —
    /// one `HEAP_BYTES`-sized extent per worker, each an independent
    /// reservation rather than a slice of one combined buffer.
    /// `starts[i]` is worker `i`'s reservation base address.
    pub fn seed_all(&self, starts: &[usize], heap_bytes: usize, now: u64) {
        assert_eq!(starts.len(), self.slots.len());
        for (slot, &start) in self.slots.iter().zip(starts) {
            slot.with_locked(|state| state.heap.seed(start, heap_bytes, now));
        }
    }

    /// Test-only convenience: seed every slot from one contiguous buffer,
    /// split into equal `heap_bytes` shares.
    #[cfg(test)]
    pub fn seed_all_contiguous(&self, base: usize, heap_bytes: usize, now: u64) {
        let starts: Vec<usize> = (0..self.slots.len()).map(|i| base + i * heap_bytes).collect();
        self.seed_all(&starts, heap_bytes, now);
    }

    /// Return the calling thread's assigned slot, claiming one on first
    /// touch against *this* registry. Indices wrap modulo `thread_count`
    /// once every slot has been claimed once, so a process spawning more
    /// OS threads than `thread_count` still functions — at the cost of
    /// sharing a slot's lock between multiple workers.
    ///
    /// The cached index is keyed by this registry's address and
    /// revalidated against its current slot count on every call, so a
    /// thread that previously claimed against a different (e.g. now
    /// dropped, now-smaller) `Registry` reclaims a fresh index here
    /// instead of reusing a stale, possibly out-of-bounds one.
    pub fn claim(&self) -> usize {
        let identity = self as *const Registry as usize;
        REGISTRY_INDEX.with(|cell| {
            if let Some((cached_identity, i)) = cell.get() {
                if cached_identity == identity && i < self.slots.len() {
                    return i;
                }
            }
            let mut next = self.next_unclaimed.lock().unwrap();
            let i = *next % self.slots.len();
            *next = next.wrapping_add(1);
            cell.set(Some((identity, i)));
            i
        })
    }

    pub fn slot(&self, index: usize) -> &LocalHeapSlot {
        &self.slots[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalHeapSlot> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_all_splits_reservation_evenly() {
        let registry = Registry::new(4);
        registry.seed_all_contiguous(0, 1024, 0);
        for slot in registry.iter() {
            slot.with_locked(|state| assert_eq!(state.heap.total_free_bytes(), 1024));
        }
    }

    #[test]
    fn claim_is_stable_per_thread_and_distinct_across_threads() {
        let registry = Registry::new(2);
        let first = registry.claim();
        let second = registry.claim();
        assert_eq!(first, second, "same thread must get the same index every time");

        let registry = std::sync::Arc::new(Registry::new(2));
        let other = {
            let r = registry.clone();
            std::thread::spawn(move || r.claim()).join().unwrap()
        };
        assert_ne!(first, other, "a second real thread should get a different slot");
    }

    #[test]
    fn claim_revalidates_against_a_different_registry_on_the_same_thread() {
        // Simulates many sequential Allocator::init()/shutdown() cycles on
        // one OS thread: claiming against a second, smaller registry must
        // not panic with the index cached from the first, larger one.
        let big = Registry::new(8);
        let big_index = big.claim();
        assert!(big_index < 8);
        drop(big);

        let small = Registry::new(1);
        let small_index = small.claim();
        assert_eq!(small_index, 0);
    }

    #[test]
    fn claim_wraps_once_every_slot_is_taken() {
        let registry = std::sync::Arc::new(Registry::new(1));
        let a = registry.claim();
        let b = {
            let r = registry.clone();
            std::thread::spawn(move || r.claim()).join().unwrap()
        };
        assert_eq!(a, b, "a single-slot registry hands the same slot to every thread");
    }
}
