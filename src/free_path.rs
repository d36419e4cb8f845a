//! The free path: always returns an extent to the calling thread's own
//! local heap, regardless of which heap originally served the
//! allocation (see the cross-thread-free end-to-end scenario).

use crate::local::Registry;
use crate::{stat_inc, trace};

/// Free `ptr`, previously returned by `allocate`. A null pointer is a
/// no-op. A pointer the local heap does not recognise (a Tier-3 escape,
/// a no-split allocation, an already-freed or foreign pointer) is also a
/// no-op — this matches the source's de-facto invalid-free contract, not
/// an error condition.
pub fn free(registry: &Registry, index: usize, ptr: *mut u8, now: u64) {
    if ptr.is_null() {
        return;
    }

    let slot = registry.slot(index);
    let freed = slot.with_locked(|state| state.heap.free_to_heap(ptr as usize, now));

    if freed {
        stat_inc!(dealloc_count);
    } else {
        trace!("rtmalloc: free of untracked pointer {:p}, ignoring", ptr);
        stat_inc!(invalid_frees);
    }
}
