//! Global atomic counters for build and poll activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the poller does this after every tick).

use std::sync::atomic::{AtomicU64, Ordering};

use drydock_state::BuildStatus;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    builds_started: AtomicU64,
    builds_succeeded: AtomicU64,
    builds_failed: AtomicU64,
    status_report_failures: AtomicU64,
    poll_ticks: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            builds_started: AtomicU64::new(0),
            builds_succeeded: AtomicU64::new(0),
            builds_failed: AtomicU64::new(0),
            status_report_failures: AtomicU64::new(0),
            poll_ticks: AtomicU64::new(0),
        }
    }

    pub fn inc_builds_started(&self) {
        self.builds_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_started", "counter incremented");
    }

    pub fn inc_builds_succeeded(&self) {
        self.builds_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_succeeded", "counter incremented");
    }

    pub fn inc_builds_failed(&self) {
        self.builds_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_failed", "counter incremented");
    }

    /// Count a finished build under its terminal status. `Pending` is not
    /// a finish and counts nowhere.
    pub fn record_build_finished(&self, status: BuildStatus) {
        match status {
            BuildStatus::Success => self.inc_builds_succeeded(),
            BuildStatus::Failure => self.inc_builds_failed(),
            BuildStatus::Pending => {
                tracing::warn!("pending build reported as finished, not counted");
            }
        }
    }

    pub fn inc_status_report_failures(&self) {
        self.status_report_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "status_report_failures", "counter incremented");
    }

    pub fn inc_poll_ticks(&self) {
        self.poll_ticks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "poll_ticks", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            builds_started = self.builds_started(),
            builds_succeeded = self.builds_succeeded(),
            builds_failed = self.builds_failed(),
            status_report_failures = self.status_report_failures(),
            poll_ticks = self.poll_ticks(),
        );
    }

    pub fn builds_started(&self) -> u64 {
        self.builds_started.load(Ordering::Relaxed)
    }

    pub fn builds_succeeded(&self) -> u64 {
        self.builds_succeeded.load(Ordering::Relaxed)
    }

    pub fn builds_failed(&self) -> u64 {
        self.builds_failed.load(Ordering::Relaxed)
    }

    pub fn status_report_failures(&self) -> u64 {
        self.status_report_failures.load(Ordering::Relaxed)
    }

    pub fn poll_ticks(&self) -> u64 {
        self.poll_ticks.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.builds_started.store(0, Ordering::Relaxed);
        self.builds_succeeded.store(0, Ordering::Relaxed);
        self.builds_failed.store(0, Ordering::Relaxed);
        self.status_report_failures.store(0, Ordering::Relaxed);
        self.poll_ticks.store(0, Ordering::Relaxed);
    }
}
