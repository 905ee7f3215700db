//! Bounded, order-preserving parallel map.
//!
//! Work is fanned out over a dedicated rayon thread pool sized by
//! [`ParallelConfig`]. Results come back in input order regardless of which
//! worker finishes first. A panic in any worker aborts the whole map.

use crate::core::config::{IfSerial, ParallelConfig};
use crate::core::error::BioappError;
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Number of available cores.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Chunk size balancing per-task overhead against load imbalance:
/// `ceil(len / (workers * 4))`, never less than 1.
pub fn default_chunksize(len: usize, max_workers: usize) -> usize {
    let denom = max_workers.max(1) * 4;
    len.div_ceil(denom).max(1)
}

/// Index of the current worker, 0 for the calling (master) thread.
pub fn get_rank() -> usize {
    rayon::current_thread_index().map_or(0, |i| i + 1)
}

/// True when not running inside a worker of a parallel map.
pub fn is_master_process() -> bool {
    rayon::current_thread_index().is_none()
}

/// Apply `f` to every input, in parallel when more than one worker is
/// available. Output order matches input order.
pub fn map<T, U, F>(
    f: F,
    inputs: Vec<T>,
    config: &ParallelConfig,
    progress: Option<&ProgressBar>,
) -> Result<Vec<U>, BioappError>
where
    T: Send,
    U: Send,
    F: Fn(T) -> U + Send + Sync,
{
    let workers = config.resolved_workers();
    let tick = |x: T| {
        let out = f(x);
        if let Some(pb) = progress {
            pb.inc(1);
        }
        out
    };

    if workers <= 1 {
        let msg = "parallel execution requested but only one worker is available";
        match config.if_serial {
            IfSerial::Raise => return Err(BioappError::Configuration(msg.to_string())),
            IfSerial::Warn => warn!("{}; running in serial", msg),
            IfSerial::Ignore => {}
        }
        return Ok(inputs.into_iter().map(tick).collect());
    }

    let chunksize = config
        .chunksize
        .unwrap_or_else(|| default_chunksize(inputs.len(), workers))
        .max(1);
    debug!(workers, chunksize, n = inputs.len(), "starting parallel map");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("bioapp-worker-{}", i))
        .build()
        .map_err(|e| BioappError::Configuration(format!("failed to build worker pool: {}", e)))?;

    Ok(pool.install(|| {
        inputs
            .into_par_iter()
            .with_min_len(chunksize)
            .map(tick)
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chunksize() {
        assert_eq!(default_chunksize(0, 3), 1);
        assert_eq!(default_chunksize(12, 3), 1);
        assert_eq!(default_chunksize(13, 3), 2);
        assert_eq!(default_chunksize(100, 2), 13);
    }

    #[test]
    fn test_map_preserves_order() {
        let config = ParallelConfig {
            max_workers: Some(3),
            chunksize: Some(1),
            if_serial: IfSerial::Ignore,
        };
        let inputs: Vec<u64> = (0..50).collect();
        let got = map(
            |x| {
                std::thread::sleep(std::time::Duration::from_millis((50 - x) % 7));
                x * 2
            },
            inputs,
            &config,
            None,
        )
        .unwrap();
        assert_eq!(got, (0..50).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_serial_raise() {
        let config = ParallelConfig {
            max_workers: Some(1),
            chunksize: None,
            if_serial: IfSerial::Raise,
        };
        let err = map(|x: i32| x, vec![1, 2], &config, None).unwrap_err();
        assert!(matches!(err, BioappError::Configuration(_)));
    }

    #[test]
    fn test_rank_inside_workers() {
        assert!(is_master_process());
        assert_eq!(get_rank(), 0);
        let config = ParallelConfig {
            max_workers: Some(2),
            chunksize: Some(1),
            if_serial: IfSerial::Ignore,
        };
        let ranks = map(|_: i32| get_rank(), vec![0; 8], &config, None).unwrap();
        assert!(ranks.iter().all(|r| (1..=2).contains(r)));
    }
}
