//! Counters for degraded and exceptional paths.
//!
//! Best-effort side effects (camera moves, snapshot attachment, artifact
//! cleanup) never fail the primary operation. Each time one is skipped or
//! fails, a counter here is bumped so the degraded path stays observable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    direct_runs: AtomicU64,
    queued_runs: AtomicU64,
    timeouts: AtomicU64,
    late_results_dropped: AtomicU64,
    cancelled_skipped: AtomicU64,
    panics: AtomicU64,
    snapshot_failures: AtomicU64,
    camera_failures: AtomicU64,
    cleanup_failures: AtomicU64,
}

/// Shared diagnostic counters. Cloning shares the same counters.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    counters: Arc<Counters>,
}

/// A point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    /// Operations run immediately because the caller was the owner thread.
    pub direct_runs: u64,
    /// Operations queued for the owner thread.
    pub queued_runs: u64,
    /// Calls that timed out waiting for the owner thread.
    pub timeouts: u64,
    /// Results produced after their caller had given up.
    pub late_results_dropped: u64,
    /// Queued operations skipped because their caller had given up.
    pub cancelled_skipped: u64,
    /// Operation bodies that panicked.
    pub panics: u64,
    /// Viewport snapshots that could not be attached to a result.
    pub snapshot_failures: u64,
    /// Camera adjustments that failed.
    pub camera_failures: u64,
    /// Visual artifacts that could not be removed.
    pub cleanup_failures: u64,
}

macro_rules! recorder {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[doc = concat!("Increments the `", stringify!($field), "` counter.")]
            pub fn $name(&self) {
                self.counters.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl Diagnostics {
    /// Creates a fresh set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    recorder! {
        record_direct_run => direct_runs,
        record_queued_run => queued_runs,
        record_timeout => timeouts,
        record_late_result => late_results_dropped,
        record_cancelled_skip => cancelled_skipped,
        record_panic => panics,
        record_snapshot_failure => snapshot_failures,
        record_camera_failure => camera_failures,
        record_cleanup_failure => cleanup_failures,
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let c = &self.counters;
        DiagnosticsSnapshot {
            direct_runs: c.direct_runs.load(Ordering::Relaxed),
            queued_runs: c.queued_runs.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            late_results_dropped: c.late_results_dropped.load(Ordering::Relaxed),
            cancelled_skipped: c.cancelled_skipped.load(Ordering::Relaxed),
            panics: c.panics.load(Ordering::Relaxed),
            snapshot_failures: c.snapshot_failures.load(Ordering::Relaxed),
            camera_failures: c.camera_failures.load(Ordering::Relaxed),
            cleanup_failures: c.cleanup_failures.load(Ordering::Relaxed),
        }
    }
}
