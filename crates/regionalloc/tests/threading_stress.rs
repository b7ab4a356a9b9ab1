//! Thread stress tests for the region arena.
//!
//! These exercise the lock-free claim path under contention, verifying that
//! concurrent alloc/free traffic never hands out overlapping block ranges,
//! never corrupts the claim maps, and leaves the arena quiescent once all
//! allocations are released.

use std::collections::{HashMap, HashSet};
use std::ptr;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use regionalloc::region::{RegionArena, BITS, BLOCK_SIZE, REGION_MAX, REGION_MAX_ALLOC};
use regionalloc::stats::MemStats;

/// Helper: a fresh arena and stats sink shared across threads.
fn fresh() -> (&'static RegionArena, &'static MemStats) {
    (
        Box::leak(Box::new(RegionArena::new())),
        Box::leak(Box::new(MemStats::new())),
    )
}

/// Wrapper to allow sending `*mut u8` across thread boundaries.
/// Safety: ownership of the block transfers with the wrapper (one thread
/// allocates, another frees); the arena itself is thread-safe.
#[derive(Clone, Copy)]
struct SendPtr(*mut u8);
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

// ---------------------------------------------------------------------------
// N threads doing rapid alloc/free cycles
// ---------------------------------------------------------------------------

fn stress_alloc_free_n_threads(num_threads: usize) {
    const ITERATIONS: usize = 200;

    let (arena, stats) = fresh();
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ITERATIONS {
                    let (p, id) = arena.alloc(BLOCK_SIZE, true, stats);
                    assert!(!p.is_null(), "alloc returned NULL under contention");
                    unsafe {
                        ptr::write_bytes(p, 0xCC, 64);
                        arena.free(p, BLOCK_SIZE, id, stats);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked during alloc/free stress");
    }

    // quiescent: every claim was released
    for idx in 0..arena.regions_count() {
        assert_eq!(arena.region_map(idx), 0, "leaked claims in region {}", idx);
    }
}

#[test]
fn stress_alloc_free_4_threads() {
    stress_alloc_free_n_threads(4);
}

#[test]
fn stress_alloc_free_8_threads() {
    stress_alloc_free_n_threads(8);
}

// ---------------------------------------------------------------------------
// Concurrent claims hand out distinct, disjoint ranges
// ---------------------------------------------------------------------------

#[test]
fn concurrent_allocs_get_distinct_ids() {
    const NUM_THREADS: usize = 8;
    const PER_THREAD: usize = 8;

    let (arena, stats) = fresh();
    let barrier = Arc::new(Barrier::new(NUM_THREADS));
    let live: Arc<Mutex<Vec<(SendPtr, usize)>>> = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let live = Arc::clone(&live);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    let (p, id) = arena.alloc(BLOCK_SIZE, true, stats);
                    assert!(!p.is_null());
                    live.lock().unwrap().push((SendPtr(p), id));
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked while claiming");
    }

    let live = Arc::try_unwrap(live).ok().unwrap().into_inner().unwrap();
    assert_eq!(live.len(), NUM_THREADS * PER_THREAD);

    // all ids distinct
    let ids: HashSet<usize> = live.iter().map(|&(_, id)| id).collect();
    assert_eq!(ids.len(), live.len(), "duplicate ids handed out");

    // all pointers distinct and block-aligned
    let ptrs: HashSet<usize> = live.iter().map(|&(SendPtr(p), _)| p as usize).collect();
    assert_eq!(ptrs.len(), live.len(), "overlapping pointers handed out");
    for &addr in &ptrs {
        assert_eq!(addr % BLOCK_SIZE, 0);
    }

    // the union of live claims matches each region map exactly
    let mut expected: HashMap<usize, usize> = HashMap::new();
    for &(_, id) in &live {
        let (idx, bitidx) = (id / BITS, id % BITS);
        assert!(idx < REGION_MAX);
        *expected.entry(idx).or_insert(0) |= 1usize << bitidx;
    }
    for idx in 0..arena.regions_count() {
        assert_eq!(
            arena.region_map(idx),
            expected.get(&idx).copied().unwrap_or(0),
            "claim map of region {} out of sync",
            idx
        );
    }

    for (SendPtr(p), id) in live {
        unsafe { arena.free(p, BLOCK_SIZE, id, stats) };
    }
    for idx in 0..arena.regions_count() {
        assert_eq!(arena.region_map(idx), 0);
    }
}

// ---------------------------------------------------------------------------
// Cross-thread free: thread A allocates, thread B frees
// ---------------------------------------------------------------------------

#[test]
fn cross_thread_free() {
    const COUNT: usize = 200;

    let (arena, stats) = fresh();
    let barrier = Arc::new(Barrier::new(2));
    let shared: Arc<Mutex<Vec<(SendPtr, usize)>>> = Arc::new(Mutex::new(Vec::new()));

    let shared_producer = Arc::clone(&shared);
    let barrier_producer = Arc::clone(&barrier);
    let producer = thread::spawn(move || {
        barrier_producer.wait();
        for _ in 0..COUNT {
            let (p, id) = arena.alloc(BLOCK_SIZE, true, stats);
            assert!(!p.is_null());
            unsafe { ptr::write_bytes(p, 0xDD, 64) };
            shared_producer.lock().unwrap().push((SendPtr(p), id));
        }
    });

    let shared_consumer = Arc::clone(&shared);
    let barrier_consumer = Arc::clone(&barrier);
    let consumer = thread::spawn(move || {
        barrier_consumer.wait();
        let mut freed = 0;
        while freed < COUNT {
            let batch: Vec<(SendPtr, usize)> = {
                let mut guard = shared_consumer.lock().unwrap();
                guard.drain(..).collect()
            };
            for (SendPtr(p), id) in batch {
                unsafe { arena.free(p, BLOCK_SIZE, id, stats) };
                freed += 1;
            }
            if freed < COUNT {
                thread::yield_now();
            }
        }
    });

    producer.join().expect("producer thread panicked");
    consumer.join().expect("consumer thread panicked");

    for idx in 0..arena.regions_count() {
        assert_eq!(arena.region_map(idx), 0);
    }
}

// ---------------------------------------------------------------------------
// Wide requests force region growth under contention
// ---------------------------------------------------------------------------

#[test]
fn contended_region_growth() {
    const NUM_THREADS: usize = 4;
    const PER_THREAD: usize = 4;

    let (arena, stats) = fresh();
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut held = Vec::new();
                for _ in 0..PER_THREAD {
                    let (p, id) = arena.alloc(REGION_MAX_ALLOC, true, stats);
                    assert!(!p.is_null());
                    held.push((p, id));
                }
                for (p, id) in held {
                    unsafe { arena.free(p, REGION_MAX_ALLOC, id, stats) };
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked during region growth");
    }

    // sixteen requests of BITS/4 blocks each keep four regions' worth of
    // bits live at the peak; all of them must be released by now
    assert!(arena.regions_count() >= 1);
    for idx in 0..arena.regions_count() {
        assert_eq!(arena.region_map(idx), 0, "leaked claims in region {}", idx);
    }
}
