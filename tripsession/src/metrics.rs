//! Session counters for observability.
//!
//! Failures that never reach API callers (positioning gaps, engine status
//! failures, stale results, contradictory phase inputs) are counted here.
//!
//! ```text
//! Worker / API ─────► SessionMetrics ─────► MetricsSnapshot ─────► CLI, tests
//!                     (atomic counters)     (point-in-time copy)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters updated by the session.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    ticks: AtomicU64,
    samples_received: AtomicU64,
    samples_superseded: AtomicU64,
    ingestion_failures: AtomicU64,
    engine_status_failures: AtomicU64,
    stale_results_discarded: AtomicU64,
    invalid_phase_transitions: AtomicU64,
    congestion_rewrites: AtomicU64,
    sessions_started: AtomicU64,
}

impl SessionMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sample_received(&self) {
        self.samples_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A sample was replaced by a newer one before it was processed.
    pub(crate) fn sample_superseded(&self) {
        self.samples_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ingestion_failure(&self) {
        self.ingestion_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn engine_status_failure(&self) {
        self.engine_status_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale_result_discarded(&self) {
        self.stale_results_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalid_phase_transition(&self) {
        self.invalid_phase_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn congestion_rewrite(&self) {
        self.congestion_rewrites.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    ///
    /// `observer_failures` is not tracked here; the session fills it from
    /// its observer registries.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            samples_received: self.samples_received.load(Ordering::Relaxed),
            samples_superseded: self.samples_superseded.load(Ordering::Relaxed),
            ingestion_failures: self.ingestion_failures.load(Ordering::Relaxed),
            engine_status_failures: self.engine_status_failures.load(Ordering::Relaxed),
            stale_results_discarded: self.stale_results_discarded.load(Ordering::Relaxed),
            invalid_phase_transitions: self.invalid_phase_transitions.load(Ordering::Relaxed),
            congestion_rewrites: self.congestion_rewrites.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            observer_failures: 0,
        }
    }
}

/// Copy of the session counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Completed worker ticks.
    pub ticks: u64,
    /// Raw samples received from the positioning source.
    pub samples_received: u64,
    /// Samples dropped in favor of a newer one.
    pub samples_superseded: u64,
    /// Positioning errors and samples the engine refused.
    pub ingestion_failures: u64,
    /// Failed or timed-out engine status calls.
    pub engine_status_failures: u64,
    /// Tick results dropped because the session stopped or routes changed.
    pub stale_results_discarded: u64,
    /// Contradictory phase inputs.
    pub invalid_phase_transitions: u64,
    /// Congestion rewrites applied to the current leg.
    pub congestion_rewrites: u64,
    /// Times the session was started.
    pub sessions_started: u64,
    /// Observer callbacks that panicked.
    pub observer_failures: u64,
}

impl MetricsSnapshot {
    /// Total failures of any kind.
    pub fn total_failures(&self) -> u64 {
        self.ingestion_failures
            + self.engine_status_failures
            + self.invalid_phase_transitions
            + self.observer_failures
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ticks={} samples={} superseded={} ingest_failures={} status_failures={} stale={} rewrites={} observer_failures={}",
            self.ticks,
            self.samples_received,
            self.samples_superseded,
            self.ingestion_failures,
            self.engine_status_failures,
            self.stale_results_discarded,
            self.congestion_rewrites,
            self.observer_failures
        )
    }
}
