//! Positioning sources that do not need a receiver.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::PositioningError;
use crate::model::{GeoPoint, NavigationRoute, RawLocationSample};

use super::{LocationSink, PositioningSource};

/// Positioning source driven by explicit [`push`](Self::push) calls.
#[derive(Debug, Default)]
pub struct ManualLocationSource {
    inner: Mutex<ManualInner>,
}

#[derive(Debug, Default)]
struct ManualInner {
    sink: Option<LocationSink>,
    last_known: Option<RawLocationSample>,
    starts: u32,
    stops: u32,
    fail_start: bool,
}

impl ManualLocationSource {
    /// Create a stopped source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start_updates` fail.
    pub fn fail_next_start(&self) {
        self.inner.lock().fail_start = true;
    }

    /// Deliver a sample if updates are running. Returns whether it was sent.
    ///
    /// The sample becomes the last known fix either way.
    pub fn push(&self, sample: RawLocationSample) -> bool {
        let sink = {
            let mut inner = self.inner.lock();
            inner.last_known = Some(sample);
            inner.sink.clone()
        };
        sink.is_some_and(|s| s.send(sample))
    }

    /// Set or forget the fix reported to a session when it starts.
    pub fn set_last_known(&self, sample: Option<RawLocationSample>) {
        self.inner.lock().last_known = sample;
    }

    /// Deliver a positioning failure if updates are running.
    pub fn push_error(&self, error: PositioningError) -> bool {
        let sink = self.inner.lock().sink.clone();
        sink.is_some_and(|s| s.send_error(error))
    }

    /// Whether updates are running.
    pub fn is_running(&self) -> bool {
        self.inner.lock().sink.is_some()
    }

    /// Number of `start_updates` calls that succeeded.
    pub fn start_count(&self) -> u32 {
        self.inner.lock().starts
    }

    /// Number of `stop_updates` calls.
    pub fn stop_count(&self) -> u32 {
        self.inner.lock().stops
    }
}

impl PositioningSource for ManualLocationSource {
    fn start_updates(&self, sink: LocationSink) -> Result<(), PositioningError> {
        let mut inner = self.inner.lock();
        if std::mem::take(&mut inner.fail_start) {
            return Err(PositioningError::Unavailable("start refused".to_string()));
        }
        inner.sink = Some(sink);
        inner.starts += 1;
        Ok(())
    }

    fn stop_updates(&self) {
        let mut inner = self.inner.lock();
        inner.sink = None;
        inner.stops += 1;
    }

    fn last_known_sample(&self) -> Option<RawLocationSample> {
        self.inner.lock().last_known
    }
}

/// Positioning source that replays recorded samples on a fixed interval.
///
/// Timestamps are rewritten to be monotonic from the moment updates start,
/// so a replay can be restarted.
#[derive(Debug)]
pub struct ReplayLocationSource {
    samples: Vec<RawLocationSample>,
    interval: Duration,
    runtime: Handle,
    running: Mutex<Option<CancellationToken>>,
    done: CancellationToken,
}

impl ReplayLocationSource {
    /// Create a replay of `samples`, one every `interval`.
    pub fn new(samples: Vec<RawLocationSample>, interval: Duration, runtime: Handle) -> Self {
        Self {
            samples,
            interval,
            runtime,
            running: Mutex::new(None),
            done: CancellationToken::new(),
        }
    }

    /// Number of samples in the recording.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the recording is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Token cancelled once the last sample has been delivered.
    pub fn finished(&self) -> CancellationToken {
        self.done.clone()
    }
}

impl PositioningSource for ReplayLocationSource {
    fn start_updates(&self, sink: LocationSink) -> Result<(), PositioningError> {
        if self.samples.is_empty() {
            return Err(PositioningError::Unavailable("empty recording".to_string()));
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.running.lock().replace(token.clone()) {
            previous.cancel();
        }

        let samples = self.samples.clone();
        let interval = self.interval;
        let done = self.done.clone();
        info!(samples = samples.len(), ?interval, "Replay started");

        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let base_ms = samples[0].timestamp_ms;
            for (i, mut sample) in samples.into_iter().enumerate() {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(delivered = i, "Replay cancelled");
                        return;
                    }
                    _ = ticker.tick() => {}
                }
                sample.timestamp_ms = base_ms + (i as u64) * interval.as_millis() as u64;
                if !sink.send(sample) {
                    debug!("Replay receiver closed");
                    return;
                }
            }
            info!("Replay finished");
            done.cancel();
        });
        Ok(())
    }

    fn stop_updates(&self) {
        if let Some(token) = self.running.lock().take() {
            token.cancel();
        }
    }

    /// The start of the trace, where the replayed receiver is parked.
    fn last_known_sample(&self) -> Option<RawLocationSample> {
        self.samples.first().copied()
    }
}

/// Samples spaced `spacing_m` apart along every leg of `route`.
///
/// Bearing and speed are filled from the geometry; timestamps assume
/// travel at `speed_mps` starting from zero.
pub fn samples_along_route(
    route: &NavigationRoute,
    spacing_m: f64,
    speed_mps: f64,
) -> Vec<RawLocationSample> {
    let spacing_m = spacing_m.max(1.0);
    let mut samples = Vec::new();
    let mut traveled_m = 0.0;
    let mut next_at_m = 0.0;

    let points: Vec<GeoPoint> = route
        .legs
        .iter()
        .flat_map(|leg| leg.geometry.iter().copied())
        .collect();

    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let segment_m = a.distance_to(&b);
        if segment_m <= f64::EPSILON {
            continue;
        }
        let bearing = a.bearing_to(&b);
        while next_at_m <= traveled_m + segment_m {
            let t = (next_at_m - traveled_m) / segment_m;
            let point = GeoPoint::new(
                a.latitude + (b.latitude - a.latitude) * t,
                a.longitude + (b.longitude - a.longitude) * t,
            );
            let timestamp_ms = (next_at_m / speed_mps.max(0.1) * 1000.0) as u64;
            samples.push(
                RawLocationSample::new(point, timestamp_ms)
                    .with_speed(speed_mps)
                    .with_bearing(bearing),
            );
            next_at_m += spacing_m;
        }
        traveled_m += segment_m;
    }

    if let Some(last) = points.last() {
        let at_end = samples
            .last()
            .is_some_and(|s| s.point.distance_to(last) < 0.5);
        if !at_end {
            let timestamp_ms = (traveled_m / speed_mps.max(0.1) * 1000.0) as u64;
            samples.push(RawLocationSample::new(*last, timestamp_ms).with_speed(0.0));
        }
    }
    samples
}
