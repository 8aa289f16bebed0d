//! Engine access for the session worker.
//!
//! The [`NavigatorPoller`] owns the per-tick conversation with the
//! map-matching engine: pick the newest raw sample, ingest it, then ask
//! for status with a deadline. Failures are logged and counted here and
//! never reach API callers.
//!
//! # Tick Policies
//!
//! ```text
//! EventDriven:     sample ──► tick ──► sample ──► tick
//! FixedCadence:    ──tick──────tick──────tick──  (newest sample since last tick)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{trace, warn};

use crate::engine::{MapMatchingEngine, NavigationStatus, SampleResult};
use crate::error::{ConfigError, EngineError};
use crate::metrics::SessionMetrics;
use crate::model::RawLocationSample;

/// Default deadline for one engine status call.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Default tick interval for [`TickPolicy::FixedCadence`].
pub const DEFAULT_CADENCE: Duration = Duration::from_secs(1);

/// When the worker runs a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// One tick per received sample, coalescing any backlog.
    #[default]
    EventDriven,
    /// One tick per interval, using the newest sample received since the
    /// last tick, if any.
    FixedCadence(Duration),
}

/// Worker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Tick trigger.
    pub tick_policy: TickPolicy,
    /// Deadline for one engine status call.
    pub status_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            tick_policy: TickPolicy::default(),
            status_timeout: DEFAULT_STATUS_TIMEOUT,
        }
    }
}

impl PollerConfig {
    /// Reject zero durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "session.status_timeout_ms".to_string(),
                value: "0".to_string(),
            });
        }
        if let TickPolicy::FixedCadence(cadence) = self.tick_policy {
            if cadence.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: "session.cadence_ms".to_string(),
                    value: "0".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Talks to the engine on behalf of the session worker.
pub struct NavigatorPoller {
    engine: Arc<dyn MapMatchingEngine>,
    status_timeout: Duration,
    metrics: Arc<SessionMetrics>,
}

impl NavigatorPoller {
    /// Create a poller for `engine`.
    pub fn new(
        engine: Arc<dyn MapMatchingEngine>,
        config: &PollerConfig,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            engine,
            status_timeout: config.status_timeout,
            metrics,
        }
    }

    /// Reduce everything queued in `rx` (plus `first`) to the newest sample.
    ///
    /// Positioning errors in the backlog are logged and counted.
    pub fn take_latest(
        &self,
        first: Option<SampleResult>,
        rx: &mut UnboundedReceiver<SampleResult>,
    ) -> Option<RawLocationSample> {
        let mut latest = None;
        let mut next = first.or_else(|| rx.try_recv().ok());
        while let Some(item) = next {
            match item {
                Ok(sample) => {
                    self.metrics.sample_received();
                    if latest.replace(sample).is_some() {
                        self.metrics.sample_superseded();
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Positioning failure, no sample this tick");
                    self.metrics.ingestion_failure();
                }
            }
            next = rx.try_recv().ok();
        }
        latest
    }

    /// Feed a sample to the engine. Returns whether it was accepted.
    pub fn ingest(&self, sample: &RawLocationSample) -> bool {
        match self.engine.ingest(sample) {
            Ok(()) => {
                trace!(timestamp_ms = sample.timestamp_ms, "Sample ingested");
                true
            }
            Err(e) => {
                warn!(error = %e, "Engine refused sample");
                self.metrics.ingestion_failure();
                false
            }
        }
    }

    /// Ask the engine for status, giving up after the configured deadline.
    pub async fn fetch_status(&self) -> Result<NavigationStatus, EngineError> {
        let result = self.request_status().await;
        if let Err(e) = &result {
            warn!(error = %e, "Engine status unavailable, keeping previous state");
            self.metrics.engine_status_failure();
        }
        result
    }

    /// Status request with the deadline applied, nothing logged or counted.
    ///
    /// Used when the engine may legitimately have nothing yet, such as
    /// right after start without a known fix.
    pub async fn request_status(&self) -> Result<NavigationStatus, EngineError> {
        match tokio::time::timeout(self.status_timeout, self.engine.status()).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(self.status_timeout)),
        }
    }
}

impl std::fmt::Debug for NavigatorPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigatorPoller")
            .field("status_timeout", &self.status_timeout)
            .finish_non_exhaustive()
    }
}
