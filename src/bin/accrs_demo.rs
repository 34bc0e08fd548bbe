//! Demo/load-generation harness: not part of the cache core, just a thin
//! driver over `accrs::TierPair` that seeds some pages and hammers them with
//! concurrent search/release workers so the eviction engines see real
//! traffic.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use tracing::info;

use accrs::buffer::{Buffer, BufferSource};
use accrs::config::CacheConfig;
use accrs::diagnostics::{init_tracing, log_stats};
use accrs::source::{FsPageSource, PageSource};
use accrs::{Tier, TierPair, VERSION};

#[derive(Parser, Debug)]
#[command(name = "accrs-demo", version = VERSION, about = "ACCRS load-generation harness")]
struct Args {
    /// Directory of pages to load instead of generating synthetic ones.
    #[arg(long)]
    page_dir: Option<PathBuf>,

    /// Number of synthetic in-memory pages to generate when `--page-dir` is absent.
    #[arg(long, default_value_t = 256)]
    synthetic_pages: usize,

    /// Size in bytes of each synthetic page.
    #[arg(long, default_value_t = 4096)]
    synthetic_page_size: usize,

    /// Total cache memory budget, in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    total_memory: u64,

    /// Percentage of the memory budget given to the raw tier.
    #[arg(long, default_value_t = 80)]
    raw_ratio: u8,

    /// Number of worker threads performing search/release cycles. Defaults
    /// to the machine's logical core count.
    #[arg(long, default_value_t = num_cpus::get())]
    workers: usize,

    /// Search/release operations performed by each worker.
    #[arg(long, default_value_t = 10_000)]
    ops_per_worker: usize,
}

fn print_banner() {
    println!("================================================");
    println!(" ACCRS demo harness -- version {}", VERSION);
    println!("================================================");
}

fn main() -> accrs::Result<()> {
    init_tracing();
    print_banner();

    let args = Args::parse();
    let config = CacheConfig {
        total_memory: args.total_memory,
        raw_ratio: args.raw_ratio,
        ..CacheConfig::default()
    };
    config.validate()?;

    let pair = Arc::new(TierPair::new(&config)?);
    let ids = seed(&pair, &args)?;
    info!(buffers_loaded = ids.len(), "seeding complete");

    let mut handles = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let pair = pair.clone();
        let ids = ids.clone();
        let ops = args.ops_per_worker;
        handles.push(thread::spawn(move || run_worker(worker, &pair, &ids, ops)));
    }
    for handle in handles {
        if let Err(panic) = handle.join() {
            tracing::error!(?panic, "worker thread panicked");
        }
    }

    log_stats(&pair.stats());
    Ok(())
}

fn seed(pair: &TierPair, args: &Args) -> accrs::Result<Vec<u32>> {
    let mut ids = Vec::new();
    match &args.page_dir {
        Some(dir) => {
            let source = FsPageSource;
            for (path, _size) in source.scan(dir)? {
                let buf = pair.load(&source, &path)?;
                ids.push(buf.id);
            }
        }
        None => {
            let mut rng = rand::rng();
            for _ in 0..args.synthetic_pages {
                let id = pair.next_buffer_id();
                let mut bytes = vec![0u8; args.synthetic_page_size];
                rng.fill(bytes.as_mut_slice());
                let buf = Buffer::initialize(id, pair.lock_pool(), BufferSource::Bytes(bytes))?;
                pair.add(Tier::Raw, Arc::new(buf))?;
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

fn run_worker(worker: usize, pair: &TierPair, ids: &[u32], ops: usize) {
    if ids.is_empty() {
        return;
    }
    let mut rng = rand::rng();
    for _ in 0..ops {
        let id = ids[rng.random_range(0..ids.len())];
        match pair.search(id) {
            Ok(buf) => {
                let mut guard = buf.lock(pair.lock_pool());
                let _ = guard.update_ref(-1);
            }
            Err(err) => {
                tracing::warn!(worker, buffer_id = id, %err, "search failed");
            }
        }
        thread::sleep(Duration::from_micros(1));
    }
}
