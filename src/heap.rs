//! A single heap: one arena of descriptors plus a free list and a used
//! list threaded through it.
//!
//! Both the local per-thread heaps and the shared global heap are built
//! from this type; what differs between them is the split threshold
//! applied on allocation and the lock that guards them (see `local.rs` and
//! `global.rs`).

use crate::config::ALLOC_ALIGN;
use crate::descriptor::{self, DescriptorArena, Handle};

/// Round `size` up to the next multiple of `ALLOC_ALIGN`.
#[inline]
pub fn round_request(size: usize) -> usize {
    (size + ALLOC_ALIGN - 1) & !(ALLOC_ALIGN - 1)
}

pub struct Heap {
    pub arena: DescriptorArena,
    free: Option<Handle>,
    used: Option<Handle>,
    // Maintained alongside the lists purely so `debug_check_counts` can
    // cross-check them against list traversal in test builds. List
    // traversal, not these counters, is the authoritative source of
    // truth for everything else in this module.
    #[cfg(feature = "testing")]
    free_count: usize,
    #[cfg(feature = "testing")]
    used_count: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            arena: DescriptorArena::new(),
            free: None,
            used: None,
            #[cfg(feature = "testing")]
            free_count: 0,
            #[cfg(feature = "testing")]
            used_count: 0,
        }
    }

    /// Assert the maintained free/used counts still match a fresh list
    /// traversal. Only compiled in with the `testing` feature; catches
    /// invariant regressions (a handle lost or duplicated across lists)
    /// without keeping these counters around in the release data model.
    #[cfg(feature = "testing")]
    fn debug_check_counts(&self) {
        let free_len = self.arena.iter_list(self.free).count();
        let used_len = self.arena.iter_list(self.used).count();
        debug_assert_eq!(free_len, self.free_count, "free list length drifted from maintained count");
        debug_assert_eq!(used_len, self.used_count, "used list length drifted from maintained count");
    }

    /// Seed the heap with a single free extent covering the whole backing
    /// reservation. Called once at `init` for every local heap and for the
    /// global heap.
    pub fn seed(&mut self, start: usize, length: usize, now: u64) {
        let h = self.arena.insert(start, length, now);
        descriptor::insert_sorted(&mut self.arena, &mut self.free, h);
        #[cfg(feature = "testing")]
        {
            self.free_count += 1;
            self.debug_check_counts();
        }
    }

    /// Best-fit search over the descending-by-length free list: the last
    /// node whose length is still `>= want` (equivalently, the first node
    /// whose successor is either absent or too small).
    pub fn find_fit(&self, want: usize) -> Option<Handle> {
        let mut candidate = None;
        for h in self.arena.iter_list(self.free) {
            if self.arena.get(h).length < want {
                break;
            }
            candidate = Some(h);
        }
        candidate
    }

    /// Carve `want` bytes out of the free extent `victim`, honoring the
    /// split/no-split asymmetry preserved from the source: splitting
    /// inserts the allocated remainder's sibling into the used list, but
    /// an exact (or near-exact) fit is detached and handed back directly,
    /// untracked by the used list. A later `free` of such a block will
    /// find nothing on the used list and silently no-op — this is a
    /// known, preserved quirk, not a bug.
    pub fn allocate_from_heap(
        &mut self,
        victim: Handle,
        want: usize,
        split_threshold: usize,
        now: u64,
    ) -> (usize, Option<Handle>) {
        descriptor::detach(&mut self.arena, &mut self.free, victim);
        #[cfg(feature = "testing")]
        {
            self.free_count -= 1;
        }

        let victim_length = self.arena.get(victim).length;
        let remainder = victim_length - want;

        let result = if remainder >= split_threshold {
            let victim_start = self.arena.get(victim).start;
            self.arena.get_mut(victim).length = want;
            self.arena.get_mut(victim).touch(now);
            descriptor::insert_sorted(&mut self.arena, &mut self.used, victim);
            #[cfg(feature = "testing")]
            {
                self.used_count += 1;
            }

            let rest = self
                .arena
                .insert(victim_start + want, remainder, now);
            descriptor::insert_sorted(&mut self.arena, &mut self.free, rest);
            #[cfg(feature = "testing")]
            {
                self.free_count += 1;
            }

            (victim_start, Some(victim))
        } else {
            self.arena.get_mut(victim).touch(now);
            let start = self.arena.get(victim).start;
            // Not inserted into the used list: see doc comment above.
            (start, None)
        };
        #[cfg(feature = "testing")]
        self.debug_check_counts();
        result
    }

    /// Return the payload at `start` to this heap. Scans the used list for
    /// a descriptor whose `start` matches; if found, detaches it, stamps
    /// `last_used`, and reinserts it into the free list (preserving I2).
    /// Returns `false` if no match was found — the pointer may be a
    /// Tier-3 OS escape, a no-split allocation (never tracked on any used
    /// list), or an invalid/foreign pointer. This is a silent no-op, not
    /// an error, matching the source's invalid-free policy.
    pub fn free_to_heap(&mut self, start: usize, now: u64) -> bool {
        let Some(handle) = self
            .arena
            .iter_list(self.used)
            .find(|&h| self.arena.get(h).start == start)
        else {
            return false;
        };
        descriptor::detach(&mut self.arena, &mut self.used, handle);
        self.arena.get_mut(handle).touch(now);
        descriptor::insert_sorted(&mut self.arena, &mut self.free, handle);
        #[cfg(feature = "testing")]
        {
            self.used_count -= 1;
            self.free_count += 1;
            self.debug_check_counts();
        }
        true
    }

    pub fn free_head(&self) -> Option<Handle> {
        self.free
    }

    pub fn used_head(&self) -> Option<Handle> {
        self.used
    }

    /// Detach a free-list node for migration to another heap (Tier 2 / the
    /// reclaimer). The caller takes ownership of the descriptor's fields
    /// via `arena.take` and recreates them in the destination arena.
    pub fn detach_free(&mut self, handle: Handle) {
        descriptor::detach(&mut self.arena, &mut self.free, handle);
        #[cfg(feature = "testing")]
        {
            self.free_count -= 1;
            self.debug_check_counts();
        }
    }

    pub fn insert_free(&mut self, handle: Handle) {
        descriptor::insert_sorted(&mut self.arena, &mut self.free, handle);
        #[cfg(feature = "testing")]
        {
            self.free_count += 1;
            self.debug_check_counts();
        }
    }

    pub fn total_free_bytes(&self) -> usize {
        self.arena.iter_list(self.free).map(|h| self.arena.get(h).length).sum()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_request_rounds_up_to_align() {
        assert_eq!(round_request(1), ALLOC_ALIGN);
        assert_eq!(round_request(ALLOC_ALIGN), ALLOC_ALIGN);
        assert_eq!(round_request(ALLOC_ALIGN + 1), ALLOC_ALIGN * 2);
    }

    #[test]
    fn find_fit_picks_smallest_adequate() {
        let mut heap = Heap::new();
        heap.seed(0, 1_000_000, 0);
        let victim = heap.find_fit(1024).unwrap();
        let (start, used_handle) = heap.allocate_from_heap(victim, 1024, 256, 0);
        assert_eq!(start, 0);
        assert!(used_handle.is_some());
        assert_eq!(heap.total_free_bytes(), 1_000_000 - 1024);
    }

    #[test]
    fn exact_fit_skips_used_list_and_free_is_a_noop() {
        let mut heap = Heap::new();
        // Seed two extents: one exact-fit sized, one large.
        heap.seed(0, 1024, 0);
        heap.seed(2048, 1_000_000, 0);

        let victim = heap.find_fit(1024).unwrap();
        assert_eq!(heap.arena.get(victim).length, 1024);
        let (start, used_handle) = heap.allocate_from_heap(victim, 1024, 256, 0);
        assert_eq!(start, 0);
        assert!(used_handle.is_none(), "exact fit must not enter the used list");

        // Attempting to free a pointer that was never tracked is a silent no-op.
        assert!(!heap.free_to_heap(start, 1));
    }

    #[test]
    fn split_then_free_round_trips_through_used_list() {
        let mut heap = Heap::new();
        heap.seed(0, 1_000_000, 0);
        let victim = heap.find_fit(1024).unwrap();
        let (start, used_handle) = heap.allocate_from_heap(victim, 1024, 256, 0);
        assert!(used_handle.is_some());

        assert!(heap.free_to_heap(start, 2));
        assert_eq!(heap.total_free_bytes(), 1_000_000);
    }

    #[cfg(feature = "testing")]
    #[test]
    fn maintained_counts_survive_a_split_then_free_round_trip() {
        let mut heap = Heap::new();
        heap.seed(0, 1_000_000, 0);
        let victim = heap.find_fit(1024).unwrap();
        let (start, _) = heap.allocate_from_heap(victim, 1024, 256, 0);
        heap.debug_check_counts();
        assert!(heap.free_to_heap(start, 2));
        heap.debug_check_counts();
    }
}
