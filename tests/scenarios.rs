//! End-to-end usage scenarios, exercised against the public `Allocator`
//! API only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rtmalloc::config::{HEAP_BYTES, RECLAIM_TICK};
use rtmalloc::Allocator;

// The stats counters these scenarios inspect are process-wide, so two
// scenarios running concurrently (the default with `cargo test`) would
// see each other's allocate/free traffic and could catch each other
// mid-flight. Serialize every scenario in this file against that one
// lock so each test observes a quiescent process when it snapshots.
static SCENARIO_LOCK: Mutex<()> = Mutex::new(());

/// Single-thread sequential allocate/write/free, many times over. Never
/// touches the global heap or the OS fallback once warmed up.
#[test]
fn scenario_single_thread_sequential() {
    let _guard = SCENARIO_LOCK.lock().unwrap();
    let alloc = Allocator::init(1).expect("init must succeed");

    for i in 0..10_000u32 {
        let ptr = alloc.allocate(1024);
        assert!(!ptr.is_null(), "allocation {i} returned null");
        unsafe {
            ptr.write_bytes((i % 256) as u8, 1024);
            assert_eq!(*ptr, (i % 256) as u8);
        }
        alloc.free(ptr);
    }

    alloc.shutdown();
}

/// Fragmentation churn: several threads hammering randomly sized
/// allocations and frees. Nothing here should ever hand back null, and
/// after every live allocation is freed the allocator's own bookkeeping
/// should show no outstanding allocations.
#[test]
fn scenario_fragmentation_churn() {
    let _guard = SCENARIO_LOCK.lock().unwrap();
    let alloc = Arc::new(Allocator::init(4).expect("init must succeed"));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let alloc = Arc::clone(&alloc);
            thread::spawn(move || {
                let mut rng_state = 0x2545F4914F6CDD1Du64 ^ (t as u64);
                let mut next = move || {
                    rng_state ^= rng_state << 13;
                    rng_state ^= rng_state >> 7;
                    rng_state ^= rng_state << 17;
                    rng_state
                };

                for _ in 0..10_000u32 {
                    let size = 16 + (next() as usize % 1024);
                    let ptr = alloc.allocate(size);
                    assert!(!ptr.is_null());
                    unsafe { ptr.write_bytes(0, size) };
                    alloc.free(ptr);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    // Quiescent period: give the background reclaimer at least one full
    // tick to run before checking for leaks, per the scenario's contract.
    thread::sleep(RECLAIM_TICK);

    let snap = rtmalloc::stats::snapshot();
    assert_eq!(
        snap.alloc_count,
        snap.dealloc_count + snap.invalid_frees,
        "every allocation must be matched by a free (invalid_frees covers no-split escapes)"
    );

    Arc::try_unwrap(alloc)
        .unwrap_or_else(|_| panic!("all threads should have joined"))
        .shutdown();
}

/// Slow-path stress: one thread exhausts its own local heap and is forced
/// through Tier 2 migration, while a second thread keeps making small
/// requests on its own heap the whole time and must keep succeeding.
#[test]
fn scenario_slow_path_stress() {
    let _guard = SCENARIO_LOCK.lock().unwrap();
    let alloc = Arc::new(Allocator::init(2).expect("init must succeed"));

    let hog = {
        let alloc = Arc::clone(&alloc);
        thread::spawn(move || {
            let mut live = Vec::new();
            let mut allocated = 0usize;
            // Keep allocating large chunks past this worker's own
            // HEAP_BYTES share, forcing repeated Tier 2 migrations.
            while allocated < HEAP_BYTES / 2 {
                let ptr = alloc.allocate(4096);
                assert!(!ptr.is_null());
                live.push(ptr);
                allocated += 4096;
            }
            for ptr in live {
                alloc.free(ptr);
            }
        })
    };

    let nibbler = {
        let alloc = Arc::clone(&alloc);
        thread::spawn(move || {
            for _ in 0..2000u32 {
                let ptr = alloc.allocate(512);
                assert!(!ptr.is_null(), "small allocation must keep succeeding under contention");
                alloc.free(ptr);
            }
        })
    };

    hog.join().unwrap();
    nibbler.join().unwrap();

    Arc::try_unwrap(alloc)
        .unwrap_or_else(|_| panic!("all threads should have joined"))
        .shutdown();
}

/// Reclaim migration: a worker allocates and frees a batch of small
/// blocks, leaving its local free list populated, then goes idle. After
/// waiting for a few reclaim ticks the background reclaimer should have
/// migrated at least one of those extents to the global heap.
#[test]
fn scenario_reclaim_migration() {
    let _guard = SCENARIO_LOCK.lock().unwrap();
    let alloc = Allocator::init(2).expect("init must succeed");

    let mut live = Vec::new();
    for _ in 0..100 {
        live.push(alloc.allocate(128));
    }
    for ptr in live {
        assert!(!ptr.is_null());
        alloc.free(ptr);
    }

    // Give the reclaimer several ticks to run its coin-flip pass.
    thread::sleep(RECLAIM_TICK * 5);

    let snap = rtmalloc::stats::snapshot();
    assert!(
        snap.reclaimed_to_global > 0,
        "expected the background reclaimer to migrate at least one extent to the global heap"
    );

    alloc.shutdown();
}

/// Cross-thread free: thread A allocates, hands the pointer to thread B,
/// and B frees it. The free must land on B's own local heap bookkeeping,
/// not A's, and must not corrupt or crash either thread.
#[test]
fn scenario_cross_thread_free() {
    let _guard = SCENARIO_LOCK.lock().unwrap();
    let alloc = Arc::new(Allocator::init(2).expect("init must succeed"));

    let a_alloc = Arc::clone(&alloc);
    let (tx, rx) = std::sync::mpsc::channel();
    let producer = thread::spawn(move || {
        let ptr = a_alloc.allocate(256);
        assert!(!ptr.is_null());
        unsafe { ptr.write_bytes(0x5A, 256) };
        tx.send(ptr as usize).unwrap();
    });

    let b_alloc = Arc::clone(&alloc);
    let consumer = thread::spawn(move || {
        let addr = rx.recv().unwrap();
        let ptr = addr as *mut u8;
        unsafe {
            for i in 0..256 {
                assert_eq!(*ptr.add(i), 0x5A);
            }
        }
        b_alloc.free(ptr);

        // A subsequent allocation on this thread must keep working.
        let next = b_alloc.allocate(256);
        assert!(!next.is_null());
        b_alloc.free(next);
    });

    producer.join().unwrap();
    consumer.join().unwrap();

    Arc::try_unwrap(alloc)
        .unwrap_or_else(|_| panic!("all threads should have joined"))
        .shutdown();
}

/// Shutdown while busy: several threads churn allocate/free for a short
/// window; once they've all stopped, shutdown must tear everything down
/// without hanging (the reclaimer joins within one tick).
#[test]
fn scenario_shutdown_while_busy() {
    let _guard = SCENARIO_LOCK.lock().unwrap();
    let alloc = Arc::new(Allocator::init(4).expect("init must succeed"));
    let stop = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let ptr = alloc.allocate(64);
                    if !ptr.is_null() {
                        alloc.free(ptr);
                    }
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(500));
    stop.store(true, Ordering::Relaxed);
    for h in handles {
        h.join().unwrap();
    }

    Arc::try_unwrap(alloc)
        .unwrap_or_else(|_| panic!("all worker threads must join before shutdown"))
        .shutdown();
}
