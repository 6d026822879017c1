use std::time::Instant;
use eddy_core::index::distance::{l2_distance, l2_distance_scalar};
use eddy_core::{FlatIndex, VectorIndex};
use rand::Rng;

fn main() {
    let n = 2048; // Default service dimension
    let iterations = 1_000_000;
    let mut rng = rand::thread_rng();

    // 1. Distance kernel
    let v1: Vec<f32> = (0..n).map(|_| rng.gen::<f32>()).collect();
    let v2: Vec<f32> = (0..n).map(|_| rng.gen::<f32>()).collect();

    println!("Benchmarking scalar L2 ({} iterations, dim {})...", iterations, n);
    let start = Instant::now();
    let mut sum_scalar = 0.0;
    for _ in 0..iterations {
        sum_scalar += l2_distance_scalar(&v1, &v2);
    }
    let scalar = start.elapsed();
    println!("Scalar: {:?} (Dummy sum: {})", scalar, sum_scalar);

    println!("Benchmarking dispatched L2 kernel...");
    let start = Instant::now();
    let mut sum_fast = 0.0;
    for _ in 0..iterations {
        sum_fast += l2_distance(&v1, &v2);
    }
    let fast = start.elapsed();
    println!("Dispatched: {:?} (Dummy sum: {})", fast, sum_fast);
    println!("Kernel speedup: {:.2}x", scalar.as_secs_f64() / fast.as_secs_f64());

    // 2. Brute-force search
    let entries = 20_000;
    let dim = 128;
    let mut index = FlatIndex::new(dim).expect("positive dimension");
    let data: Vec<Vec<f32>> = (0..entries)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect())
        .collect();
    index.insert(&data, None, false).expect("insert");

    let queries: Vec<Vec<f32>> = (0..100)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect())
        .collect();
    println!("\nBenchmarking exact search ({} entries, dim {}, {} queries, k=10)...", entries, dim, queries.len());
    let start = Instant::now();
    let results = index.search(&queries, 10).expect("search");
    let elapsed = start.elapsed();
    println!(
        "Search: {:?} total, {:.1} queries/s (first hit distance {:.4})",
        elapsed,
        queries.len() as f64 / elapsed.as_secs_f64(),
        results[0].distances[0]
    );
}
