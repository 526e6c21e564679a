//! Batch progress counters and the periodic reporter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared counters, updated by task drivers.
#[derive(Debug, Default)]
pub struct Progress {
    pub dispatched: AtomicUsize,
    pub completed: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
    pub rate_limited: AtomicUsize,
    pub rerouted: AtomicUsize,
    pub cancelled: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub dispatched: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rate_limited: usize,
    pub rerouted: usize,
    pub cancelled: usize,
}

impl Progress {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            rerouted: self.rerouted.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Log a progress line every `interval` until `cancel` fires.
pub fn spawn_reporter(
    progress: Arc<Progress>,
    total: usize,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let s = progress.snapshot();
                    tracing::info!(
                        completed = s.completed,
                        total,
                        succeeded = s.succeeded,
                        failed = s.failed,
                        rate_limited = s.rate_limited,
                        rerouted = s.rerouted,
                        "Batch progress"
                    );
                }
            }
        }
    })
}
