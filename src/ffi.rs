//! C-ABI exports over a single process-wide [`Allocator`].
//!
//! Gated behind `features = ["ffi"]`: the allocator's boundary is equally
//! implementable in any systems language, so this surface mirrors the
//! safe Rust API as a plain C ABI. The default library build exposes only
//! the safe Rust API; this module is additive.

use std::sync::OnceLock;

use crate::lifecycle::Allocator;

static INSTANCE: OnceLock<Allocator> = OnceLock::new();

/// Initialize the process-wide allocator. Must be called once before any
/// other `rtmalloc_*` call. Returns `0` on success, `-1` if already
/// initialized or if a backing reservation failed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rtmalloc_init(thread_count: usize) -> i32 {
    match Allocator::init(thread_count) {
        Ok(alloc) => {
            if INSTANCE.set(alloc).is_ok() {
                0
            } else {
                -1
            }
        }
        Err(_) => -1,
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn rtmalloc_allocate(size: usize) -> *mut u8 {
    match INSTANCE.get() {
        Some(alloc) => alloc.allocate(size),
        None => std::ptr::null_mut(),
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn rtmalloc_free(ptr: *mut u8) {
    if let Some(alloc) = INSTANCE.get() {
        alloc.free(ptr);
    }
}

/// Shutdown is modeled as a no-op here: the process-wide instance is a
/// `OnceLock` with no safe way to consume it back out, matching the
/// `extern "C"` surface's inability to express move-out-of-static
/// semantics. Callers that need a clean shutdown should use the Rust API
/// (`Allocator::init`/`shutdown`) directly instead of the FFI surface.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rtmalloc_shutdown() {}
