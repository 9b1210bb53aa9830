//! Bounded worker pool and cooperative cancellation.
//!
//! Workers are plain kernel threads scoped to one call. They pull job
//! indices in order from a shared cursor, run the job on their own stack and
//! buffers, and send `(index, result)` back over a channel; the caller
//! reorders results into a slot table indexed by job index, so the output
//! never depends on scheduling.
//!
//! Cancellation is checked between jobs, never inside one: a worker that has
//! started a block finishes it, the collector discards the result, and the
//! caller sees [`TzpError::Cancelled`]. The first job error wins and cancels
//! the remaining work the same way.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::TzpError;

// ── CancelToken ──────────────────────────────────────────────────────────────

/// Cloneable cooperative cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. In-flight blocks still complete.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

// ── Pool ─────────────────────────────────────────────────────────────────────

/// Default worker count: one per logical CPU, never more than there are jobs.
pub fn default_workers(jobs: usize) -> usize {
    num_cpus::get().min(jobs).max(1)
}

/// Run `jobs` independent jobs across `workers` threads and return their
/// results in job order.
///
/// `job(i)` must be pure with respect to `i`; results are slotted by index,
/// so the returned vector is identical regardless of scheduling. Returns the
/// first job error, or [`TzpError::Cancelled`] if the token fired before
/// every job produced a result.
pub fn run_indexed<T, F>(
    workers: usize,
    jobs:    usize,
    cancel:  &CancelToken,
    job:     F,
) -> Result<Vec<T>, TzpError>
where
    T: Send,
    F: Fn(usize) -> Result<T, TzpError> + Sync,
{
    if jobs == 0 {
        return if cancel.is_cancelled() {
            Err(TzpError::Cancelled)
        } else {
            Ok(Vec::new())
        };
    }

    let workers = workers.clamp(1, jobs);
    let cursor = AtomicUsize::new(0);
    let (tx, rx) = crossbeam_channel::unbounded::<(usize, Result<T, TzpError>)>();

    let mut slots: Vec<Option<T>> = Vec::with_capacity(jobs);
    slots.resize_with(jobs, || None);
    let mut first_error: Option<TzpError> = None;

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let cursor = &cursor;
            let job = &job;
            scope.spawn(move || loop {
                if cancel.is_cancelled() {
                    break;
                }
                let i = cursor.fetch_add(1, Ordering::Relaxed);
                if i >= jobs {
                    break;
                }
                if tx.send((i, job(i))).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        for (i, result) in rx {
            match result {
                Ok(value) => slots[i] = Some(value),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                        cancel.cancel();
                    }
                }
            }
        }
    });

    if let Some(e) = first_error {
        return Err(e);
    }
    let results: Vec<T> = slots.into_iter().flatten().collect();
    if results.len() != jobs {
        return Err(TzpError::Cancelled);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_come_back_in_job_order() {
        let cancel = CancelToken::new();
        let out = run_indexed(4, 100, &cancel, |i| Ok(i * 2)).unwrap();
        assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn zero_jobs_is_empty() {
        let cancel = CancelToken::new();
        let out: Vec<usize> = run_indexed(4, 0, &cancel, |_| Ok(0)).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn first_error_wins_and_stops_the_pool() {
        let cancel = CancelToken::new();
        let err = run_indexed(2, 1000, &cancel, |i| {
            if i == 3 {
                Err(TzpError::GlobalChecksumMismatch)
            } else {
                Ok(i)
            }
        });
        assert!(matches!(err, Err(TzpError::GlobalChecksumMismatch)));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn pre_cancelled_token_short_circuits() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err: Result<Vec<usize>, _> = run_indexed(4, 10, &cancel, |i| Ok(i));
        assert!(matches!(err, Err(TzpError::Cancelled)));
    }

    #[test]
    fn single_worker_behaves() {
        let cancel = CancelToken::new();
        let out = run_indexed(1, 5, &cancel, |i| Ok(i + 1)).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }
}
