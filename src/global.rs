//! The shared global heap: a single [`Heap`] behind one spinlock, shared
//! by every worker thread and the background reclaimer.

use crate::heap::Heap;
use crate::sync::SpinMutex;

pub struct GlobalHeap {
    heap: SpinMutex<Heap>,
}

impl GlobalHeap {
    /// Seed the global heap with one free extent covering `length` bytes
    /// starting at `start` (the whole global backing reservation).
    pub fn new(start: usize, length: usize, now: u64) -> Self {
        let mut heap = Heap::new();
        heap.seed(start, length, now);
        Self {
            heap: SpinMutex::new(heap),
        }
    }

    /// Run `f` with the global heap locked. This is the single lock taken
    /// on the Tier 2 slow path and by the reclaimer; both always acquire
    /// this lock before any local heap's lock (see `alloc_path`/`reclaim`).
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        let mut guard = self.heap.lock();
        f(&mut guard)
    }

    pub fn total_free_bytes(&self) -> usize {
        self.heap.lock().total_free_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_one_free_extent() {
        let global = GlobalHeap::new(0, 4096, 0);
        assert_eq!(global.total_free_bytes(), 4096);
    }

    #[test]
    fn with_locked_allows_mutation() {
        let global = GlobalHeap::new(0, 4096, 0);
        global.with_locked(|heap| {
            let victim = heap.find_fit(256).unwrap();
            heap.allocate_from_heap(victim, 256, 1024, 1);
        });
        assert_eq!(global.total_free_bytes(), 4096 - 256);
    }
}
