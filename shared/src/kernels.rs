//! Worker pool setup for the per-pixel array kernels.
//!
//! The kernels themselves are plain `ndarray` + `rayon` code and produce the
//! same result for any thread count; the pool size is purely a tuning knob
//! taken from the `NPROC` setting.

use log::{info, warn};

/// Clamp a requested worker count to `[1, available cores]`
pub fn effective_threads(requested: usize) -> usize {
    requested.clamp(1, num_cpus::get().max(1))
}

/// Configure the global rayon pool used by the array kernels.
///
/// The global pool can only be built once per process; later calls leave the
/// existing pool in place and return its size.
pub fn init_thread_pool(requested: usize) -> usize {
    let threads = effective_threads(requested);
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        Ok(()) => {
            info!("Array kernels use {threads} worker threads");
            threads
        }
        Err(e) => {
            let current = rayon::current_num_threads();
            warn!("Kernel pool already initialized with {current} threads: {e}");
            current
        }
    }
}

/// Build a private pool, for callers that must not touch the global one.
pub fn local_pool(requested: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(effective_threads(requested))
        .build()
}
