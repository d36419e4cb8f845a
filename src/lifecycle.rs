//! Bootstrap and teardown: reserve backing memory, install the global
//! and local heaps, spawn the reclaimer, and tear everything down again
//! at `shutdown`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::alloc_path;
use crate::config::HEAP_BYTES;
use crate::free_path;
use crate::global::GlobalHeap;
use crate::local::Registry;
use crate::platform;
use crate::reclaim::{ReclaimPolicy, Reclaimer};

#[derive(Debug)]
pub enum InitError {
    /// The OS refused one of the backing virtual-memory reservations.
    ReservationFailed,
}

struct Reservation {
    ptr: *mut u8,
    len: usize,
}

// The raw pointer is only read (never mutated concurrently): once at
// `init` to seed a heap, once at `shutdown` to release it.
unsafe impl Send for Reservation {}
unsafe impl Sync for Reservation {}

/// The allocator's process-wide context. Every bit of state that would
/// otherwise be global mutable state — the global heap, the reclaimer's
/// `keep_running` flag, its join handle — lives behind this one value
/// instead, passed by reference rather than reached for through statics.
pub struct Allocator {
    registry: Arc<Registry>,
    global: Arc<GlobalHeap>,
    reclaimer: Option<Reclaimer>,
    tick_counter: Arc<AtomicU64>,
    global_reservation: Reservation,
    local_reservations: Vec<Reservation>,
}

impl Allocator {
    /// Reserve the global backing (`HEAP_BYTES * thread_count`) as one
    /// extent, reserve each worker its own `HEAP_BYTES` extent, and spawn
    /// the reclaimer. `thread_count == 0` means "use
    /// `std::thread::available_parallelism()`".
    pub fn init(thread_count: usize) -> Result<Allocator, InitError> {
        Self::init_with_policy(thread_count, ReclaimPolicy::CoinFlip)
    }

    pub fn init_with_policy(thread_count: usize, policy: ReclaimPolicy) -> Result<Allocator, InitError> {
        let thread_count = if thread_count == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            thread_count
        };

        let global_len = HEAP_BYTES
            .checked_mul(thread_count)
            .ok_or(InitError::ReservationFailed)?;
        let global_ptr = unsafe { platform::reserve(global_len) };
        if global_ptr.is_null() {
            return Err(InitError::ReservationFailed);
        }

        let mut local_reservations = Vec::with_capacity(thread_count);
        let mut local_starts = Vec::with_capacity(thread_count);
        for _ in 0..thread_count {
            let ptr = unsafe { platform::reserve(HEAP_BYTES) };
            if ptr.is_null() {
                for r in &local_reservations {
                    let r: &Reservation = r;
                    unsafe { platform::release(r.ptr, r.len) };
                }
                unsafe { platform::release(global_ptr, global_len) };
                return Err(InitError::ReservationFailed);
            }
            local_starts.push(ptr as usize);
            local_reservations.push(Reservation { ptr, len: HEAP_BYTES });
        }

        let registry = Arc::new(Registry::new(thread_count));
        registry.seed_all(&local_starts, HEAP_BYTES, 0);

        let global = Arc::new(GlobalHeap::new(global_ptr as usize, global_len, 0));
        let tick_counter = Arc::new(AtomicU64::new(0));

        let reclaimer = Reclaimer::spawn(
            Arc::clone(&registry),
            Arc::clone(&global),
            Arc::clone(&tick_counter),
            policy,
        );

        Ok(Allocator {
            registry,
            global,
            reclaimer: Some(reclaimer),
            tick_counter,
            global_reservation: Reservation {
                ptr: global_ptr,
                len: global_len,
            },
            local_reservations,
        })
    }

    #[inline]
    fn now(&self) -> u64 {
        self.tick_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Allocate `size` bytes, 64-byte aligned. Returns null only if the
    /// OS itself refused the Tier-3 fallback request.
    pub fn allocate(&self, size: usize) -> *mut u8 {
        let index = self.registry.claim();
        let now = self.now();
        alloc_path::allocate(&self.registry, &self.global, index, size, now)
    }

    /// Free a pointer previously returned by `allocate`. Null is a no-op;
    /// an unrecognised pointer is also a silent no-op (see `free_path`).
    pub fn free(&self, ptr: *mut u8) {
        let index = self.registry.claim();
        let now = self.now();
        free_path::free(&self.registry, index, ptr, now);
    }

    /// Stop and join the reclaimer, then release every backing
    /// reservation. Further `allocate`/`free` calls are undefined
    /// behavior after this returns.
    pub fn shutdown(mut self) {
        if let Some(reclaimer) = self.reclaimer.take() {
            reclaimer.shutdown();
        }
        for r in self.local_reservations.drain(..) {
            unsafe { platform::release(r.ptr, r.len) };
        }
        unsafe { platform::release(self.global_reservation.ptr, self.global_reservation.len) };
    }
}
