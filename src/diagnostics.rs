//! Structured logging setup and the stats surface external monitors poll.

pub use crate::tier_pair::CacheStats;

/// Initializes the global `tracing` subscriber the way the rest of this
/// crate's demo harness expects: thread ids on, target module names off.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}

/// Emits one `info` line summarizing a stats snapshot. Called by the demo
/// harness on a fixed interval; cheap enough to call from a hot path too.
pub fn log_stats(stats: &CacheStats) {
    tracing::info!(
        raw_count = stats.raw_count,
        raw_bytes = stats.raw_bytes,
        comp_count = stats.comp_count,
        comp_bytes = stats.comp_bytes,
        sweeps_run = stats.sweeps_run,
        pops_run = stats.pops_run,
        restores_run = stats.restores_run,
        "cache stats"
    );
}
