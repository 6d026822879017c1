use std::time::{Instant, Duration};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Barrier;
use eddy_core::{FlatIndex, SharedIndex};
use futures::future::join_all;
use log::info;
use rand::Rng;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 16)]
    concurrency: usize,

    #[arg(short, long, default_value_t = 2000)]
    requests: usize,

    #[arg(short, long, default_value_t = 128)]
    dimension: usize,

    #[arg(short, long, default_value = "mixed")]
    mode: String, // insert, update, search, mixed

    /// Entries loaded before the clock starts
    #[arg(short, long, default_value_t = 10_000)]
    preload: usize,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum Op {
    Insert,
    Update,
    Search,
}

fn random_vector(rng: &mut impl Rng, dimension: usize) -> Vec<f32> {
    (0..dimension).map(|_| rng.gen::<f32>()).collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let concurrency = args.concurrency.max(1);
    let total_requests = concurrency * args.requests;

    println!("--- EDDY CONCURRENCY BENCHMARK ---");
    println!("Mode:          {}", args.mode);
    println!("Concurrency:   {} Tasks", concurrency);
    println!("Reqs per Task: {}", args.requests);
    println!("Total Reqs:    {}", total_requests);
    println!("Dimension:     {}", args.dimension);
    println!("----------------------------------\n");

    let index = Arc::new(SharedIndex::new(FlatIndex::new(args.dimension)?));
    {
        let mut rng = rand::thread_rng();
        let preload: Vec<Vec<f32>> = (0..args.preload).map(|_| random_vector(&mut rng, args.dimension)).collect();
        index.insert(&preload, None, false)?;
        info!("Preloaded {} vectors", index.count());
    }
    let preloaded = index.count();

    let barrier = Arc::new(Barrier::new(concurrency));
    let global_acks = Arc::new(AtomicUsize::new(0));
    let inserted = Arc::new(AtomicUsize::new(0));
    let global_start = Instant::now();

    let mut handles = Vec::with_capacity(concurrency);
    for task_id in 0..concurrency {
        let b = barrier.clone();
        let acks_ref = global_acks.clone();
        let inserted_ref = inserted.clone();
        let index = index.clone();
        let dimension = args.dimension;
        let reqs_per_task = args.requests;

        // Half writers, half readers in mixed mode.
        let op = match args.mode.as_str() {
            "insert" => Op::Insert,
            "update" => Op::Update,
            "search" => Op::Search,
            _ if task_id % 2 == 0 => Op::Search,
            _ if task_id % 4 == 1 => Op::Insert,
            _ => Op::Update,
        };

        handles.push(tokio::spawn(async move {
            // Waiting here holds no blocking-pool thread.
            b.wait().await;

            tokio::task::spawn_blocking(move || {
                let mut rng = rand::thread_rng();
                let mut latencies = Vec::with_capacity(reqs_per_task);

                for _ in 0..reqs_per_task {
                    let v = random_vector(&mut rng, dimension);
                    let start = Instant::now();
                    let ok = match op {
                        Op::Insert => {
                            // Far above anything the preload auto-assigned.
                            let id = (1u64 << 40) + inserted_ref.fetch_add(1, Ordering::Relaxed) as u64;
                            index.insert(&[v], Some(&[id]), false).is_ok()
                        }
                        Op::Update => {
                            let id = rng.gen_range(0..preloaded.max(1)) as u64;
                            index.update(&[v], Some(&[id])).is_ok()
                        }
                        Op::Search => index.search(&[v], 10).map(|r| r[0].len() <= 10).unwrap_or(false),
                    };
                    latencies.push(start.elapsed());
                    if ok {
                        let total = acks_ref.fetch_add(1, Ordering::Relaxed) + 1;
                        if total % 10000 == 0 {
                            println!("[PROGRESS] {:>6} / {} ops completed...", total, total_requests);
                        }
                    }
                }
                latencies
            })
            .await
            .unwrap_or_default()
        }));
    }

    let mut all_latencies = Vec::new();
    for res in join_all(handles).await {
        if let Ok(mut task_lats) = res {
            all_latencies.append(&mut task_lats);
        }
    }

    let total_time = global_start.elapsed();
    let actual_acks = global_acks.load(Ordering::Relaxed);
    let throughput = actual_acks as f64 / total_time.as_secs_f64();

    // Statistics
    all_latencies.sort();
    let count = all_latencies.len();
    let avg = if count > 0 { all_latencies.iter().sum::<Duration>() / count as u32 } else { Duration::from_secs(0) };
    let p50 = if count > 0 { all_latencies[count / 2] } else { Duration::from_secs(0) };
    let p99 = if count > 0 { all_latencies[((count as f64 * 0.99) as usize).min(count - 1)] } else { Duration::from_secs(0) };
    let max = if count > 0 { all_latencies[count - 1] } else { Duration::from_secs(0) };

    // Snapshot cost at the final size.
    let dir = tempfile::tempdir()?;
    let snap_start = Instant::now();
    let saved = index.save(&dir.path().join("stress.eddy"))?;
    let snap_time = snap_start.elapsed();

    println!("\n==================================================");
    println!("            EDDY BENCHMARK RECEIPT                ");
    println!("==================================================");
    println!(" [ BLOCK 1: TEST CONFIGURATION ]");
    println!(" Targets:      {} requests", total_requests);
    println!(" Concurrency:  {} tasks", concurrency);
    println!(" Mode:         {}", args.mode);
    println!("--------------------------------------------------");
    println!(" [ BLOCK 2: EXECUTION INTEGRITY ]");
    let status = if actual_acks == total_requests { "PASS" } else { "FAIL" };
    println!(" Status:       {}", status);
    println!(" Completed:    {}/{}", actual_acks, total_requests);
    println!(" Rejected:     {}", total_requests - actual_acks);
    println!(" Final Size:   {} vectors ({} inserted)", index.count(), inserted.load(Ordering::Relaxed));
    println!("--------------------------------------------------");
    println!(" [ BLOCK 3: PERFORMANCE METRICS ]");
    println!(" Wall Clock:   {:.2?}", total_time);
    println!(" Throughput:   {:.2} ops/sec", throughput);
    println!(" Snapshot:     {} vectors in {:.2?}", saved, snap_time);
    println!("--------------------------------------------------");
    println!(" [ BLOCK 4: STATISTICAL LATENCY ]");
    println!(" Average:      {:.2?}", avg);
    println!(" P50 (Median): {:.2?}", p50);
    println!(" P99 (Tail):   {:.2?}", p99);
    println!(" Max/Jitter:   {:.2?}", max);
    println!("==================================================\n");

    Ok(())
}
