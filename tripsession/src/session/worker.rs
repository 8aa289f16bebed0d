//! Background task that runs ticks while the session is started.
//!
//! One worker exists per start. It owns the receiving end of the sample
//! channel, so ticks are strictly sequential: ingest, status fetch and
//! publish of one tick finish before the next tick reads a sample.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::SampleResult;
use crate::model::RawLocationSample;
use crate::poller::{NavigatorPoller, TickPolicy};

use super::shared::{SessionCore, TickScope};

pub(crate) struct SessionWorker {
    core: Arc<SessionCore>,
    poller: NavigatorPoller,
    policy: TickPolicy,
    generation: u64,
}

impl SessionWorker {
    pub(crate) fn new(
        core: Arc<SessionCore>,
        poller: NavigatorPoller,
        policy: TickPolicy,
        generation: u64,
    ) -> Self {
        Self {
            core,
            poller,
            policy,
            generation,
        }
    }

    /// Run until cancelled. `last_known` is the positioning source's most
    /// recent fix, used for the startup tick.
    pub(crate) async fn run(
        self,
        last_known: Option<RawLocationSample>,
        mut samples: UnboundedReceiver<SampleResult>,
        cancel: CancellationToken,
    ) {
        info!(generation = self.generation, policy = ?self.policy, "Session worker started");

        let had_fix = last_known.is_some();
        self.initial_tick(last_known, &cancel).await;

        match self.policy {
            TickPolicy::EventDriven => loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    item = samples.recv() => {
                        let Some(item) = item else {
                            debug!("Positioning source closed its sink");
                            break;
                        };
                        if let Some(sample) = self.poller.take_latest(Some(item), &mut samples) {
                            self.tick(Some(sample), &cancel).await;
                        }
                    }
                }
            },
            TickPolicy::FixedCadence(period) => {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                let mut has_sample = had_fix;
                loop {
                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => break,

                        _ = ticker.tick() => {
                            let sample = self.poller.take_latest(None, &mut samples);
                            has_sample |= sample.is_some();
                            // Nothing to report until the first fix.
                            if has_sample {
                                self.tick(sample, &cancel).await;
                            }
                        }
                    }
                }
            }
        }

        info!(generation = self.generation, "Session worker stopped");
    }

    /// Publish a location right after start, before any new sample.
    ///
    /// A known fix is ingested and fetched like a regular tick. Without one
    /// the engine is asked for whatever it already has; a failure there is
    /// expected and not counted. Route progress waits for the first
    /// regular tick.
    async fn initial_tick(
        &self,
        last_known: Option<RawLocationSample>,
        cancel: &CancellationToken,
    ) {
        let epoch = self.core.route_epoch();

        let status = match last_known {
            Some(sample) => {
                debug!(timestamp_ms = sample.timestamp_ms, "Starting from last known fix");
                self.core.publish_raw(self.generation, sample);
                if !self.poller.ingest(&sample) {
                    return;
                }
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => return,

                    status = self.poller.fetch_status() => status.ok(),
                }
            }
            None => tokio::select! {
                biased;

                _ = cancel.cancelled() => return,

                status = self.poller.request_status() => match status {
                    Ok(status) => Some(status),
                    Err(e) => {
                        debug!(error = %e, "No engine status at start");
                        None
                    }
                },
            },
        };
        let Some(status) = status else {
            return;
        };

        if self
            .core
            .apply_status(self.generation, epoch, status, TickScope::LocationOnly)
        {
            self.core.metrics().tick();
        }
    }

    /// One ingest, fetch, publish cycle.
    async fn tick(&self, sample: Option<RawLocationSample>, cancel: &CancellationToken) {
        // Routes replaced after this point invalidate the tick's progress.
        let epoch = self.core.route_epoch();

        if let Some(sample) = sample {
            self.core.publish_raw(self.generation, sample);
            if !self.poller.ingest(&sample) {
                return;
            }
        }

        let status = tokio::select! {
            biased;

            _ = cancel.cancelled() => return,

            status = self.poller.fetch_status() => status,
        };
        let Ok(status) = status else {
            return;
        };

        if self
            .core
            .apply_status(self.generation, epoch, status, TickScope::Full)
        {
            self.core.metrics().tick();
        }
    }
}
