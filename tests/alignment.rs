//! Alignment tests.
//!
//! This allocator's alignment story is fixed: every request is rounded
//! up to a multiple of 64 bytes and the underlying reservations are
//! themselves page-aligned, so every returned pointer is 64-byte
//! aligned regardless of the requested size. Unlike `Layout`-driven
//! allocators, there is no per-call alignment parameter to vary — so
//! these tests sweep sizes instead.

use rtmalloc::Allocator;

const ALLOC_ALIGN: usize = 64;

#[test]
fn every_size_is_64_byte_aligned() {
    let alloc = Allocator::init(1).expect("init must succeed");

    for &size in &[1, 8, 63, 64, 65, 127, 256, 1000, 4096, 65536] {
        let ptr = alloc.allocate(size);
        assert!(!ptr.is_null(), "alloc failed for size {size}");
        assert_eq!(
            ptr as usize % ALLOC_ALIGN,
            0,
            "misaligned pointer for size {size}: {ptr:?}"
        );
        unsafe { ptr.write_bytes(0xAB, size) };
        alloc.free(ptr);
    }

    alloc.shutdown();
}

#[test]
fn many_concurrent_allocations_stay_aligned() {
    let alloc = Allocator::init(1).expect("init must succeed");
    let mut live = Vec::new();

    for i in 0..2000 {
        let size = 64 + (i % 37) * 64;
        let ptr = alloc.allocate(size);
        assert!(!ptr.is_null());
        assert_eq!(ptr as usize % ALLOC_ALIGN, 0);
        live.push((ptr, size));
    }

    for (ptr, size) in live {
        unsafe { ptr.write_bytes(0, size) };
        alloc.free(ptr);
    }

    alloc.shutdown();
}

#[test]
fn zero_size_request_still_returns_an_aligned_pointer() {
    let alloc = Allocator::init(1).expect("init must succeed");
    // Rounding a zero-byte request still yields a full ALLOC_ALIGN-sized
    // extent, since round_request rounds *up* to the next multiple.
    let ptr = alloc.allocate(0);
    assert!(!ptr.is_null());
    assert_eq!(ptr as usize % ALLOC_ALIGN, 0);
    alloc.free(ptr);
    alloc.shutdown();
}
