/// Microbenchmarks for the region arena.
///
/// Measures alloc/free latency against the process-global arena for the
/// segment-sized requests the arena is built for, plus multi-threaded
/// claim throughput. Run with `cargo run --release --bin micro`.
use std::hint::black_box;
use std::time::Instant;

use regionalloc::region::{self, BLOCK_SIZE, REGION_MAX_ALLOC};
use regionalloc::stats;

/// Measure alloc/free latency for a given size, N iterations.
fn bench_alloc_free(size: usize, iterations: usize) -> f64 {
    // Warmup; also faults the region reservation in
    for _ in 0..100 {
        let (p, id) = region::alloc(black_box(size), true, &stats::GLOBAL);
        unsafe {
            std::ptr::write_bytes(p, 0xAB, 64);
            region::free(black_box(p), size, id, &stats::GLOBAL);
        }
    }
    let start = Instant::now();
    for _ in 0..iterations {
        let (p, id) = region::alloc(black_box(size), true, &stats::GLOBAL);
        unsafe {
            std::ptr::write_bytes(p, 0xAB, 64);
            region::free(black_box(p), size, id, &stats::GLOBAL);
        }
    }
    let elapsed = start.elapsed();
    elapsed.as_nanos() as f64 / iterations as f64
}

/// Measure uncommitted claim/release latency (no page traffic at all).
fn bench_claim_release(size: usize, iterations: usize) -> f64 {
    for _ in 0..100 {
        let (p, id) = region::alloc(black_box(size), false, &stats::GLOBAL);
        unsafe { region::free(black_box(p), size, id, &stats::GLOBAL) };
    }
    let start = Instant::now();
    for _ in 0..iterations {
        let (p, id) = region::alloc(black_box(size), false, &stats::GLOBAL);
        unsafe { region::free(black_box(p), size, id, &stats::GLOBAL) };
    }
    let elapsed = start.elapsed();
    elapsed.as_nanos() as f64 / iterations as f64
}

/// Measure multi-threaded claim throughput.
fn bench_threaded_throughput(num_threads: usize, ops_per_thread: usize, size: usize) -> f64 {
    let start = Instant::now();
    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            std::thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    let (p, id) = region::alloc(black_box(size), true, &stats::GLOBAL);
                    unsafe {
                        std::ptr::write_bytes(p, 0xCD, 16);
                        region::free(black_box(p), size, id, &stats::GLOBAL);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    let elapsed = start.elapsed();
    let total_ops = num_threads * ops_per_thread;
    total_ops as f64 / elapsed.as_secs_f64() // ops/sec
}

fn main() {
    let iterations = 10_000;

    println!("=== region arena microbenchmarks ===\n");

    println!("--- alloc/free latency, committed (ns/op) ---");
    for &size in &[
        BLOCK_SIZE,
        2 * BLOCK_SIZE,
        4 * BLOCK_SIZE,
        REGION_MAX_ALLOC,
        2 * REGION_MAX_ALLOC, // direct OS bypass
    ] {
        let ns = bench_alloc_free(size, iterations);
        println!("  size={:>10}: {:>10.1} ns", size, ns);
    }

    println!("\n--- claim/release latency, uncommitted (ns/op) ---");
    for &size in &[BLOCK_SIZE, 4 * BLOCK_SIZE, REGION_MAX_ALLOC] {
        let ns = bench_claim_release(size, iterations);
        println!("  size={:>10}: {:>10.1} ns", size, ns);
    }

    println!("\n--- threaded claim throughput (ops/sec) ---");
    for &threads in &[1usize, 2, 4, 8] {
        let ops = bench_threaded_throughput(threads, iterations / 2, BLOCK_SIZE);
        println!("  threads={:>2}: {:>12.0} ops/sec", threads, ops);
    }

    println!(
        "\npeak committed: {} MiB, reserved: {} MiB",
        stats::GLOBAL.committed_peak() >> 20,
        stats::GLOBAL.reserved() >> 20
    );
}
