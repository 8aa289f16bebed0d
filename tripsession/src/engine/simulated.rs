//! A self-contained engine that snaps samples onto the primary route.
//!
//! Used by the CLI simulator and by tests. Matching is a nearest-segment
//! projection in a local flat approximation, which is accurate enough
//! for the short segments of a route geometry.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::EngineError;
use crate::model::{
    EnhancedLocation, GeoPoint, InstructionCues, NavigationRoute, RawLocationSample,
    RoadAttribution, RoadClass, RouteProgressState,
};

use super::{BoxFuture, MapMatchingEngine, NavigationStatus, ProgressReport};

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Speed assumed for time estimates when the sample carries none.
const FALLBACK_SPEED_MPS: f64 = 13.9;

/// Tuning for [`SimulatedEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedEngineConfig {
    /// Distance from the route beyond which the user is off route.
    pub off_route_threshold_m: f64,
    /// Remaining distance under which the trip is complete.
    pub arrival_threshold_m: f64,
    /// Artificial latency of every status call.
    pub status_delay: Duration,
}

impl Default for SimulatedEngineConfig {
    fn default() -> Self {
        Self {
            off_route_threshold_m: 50.0,
            arrival_threshold_m: 10.0,
            status_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    routes: Vec<NavigationRoute>,
    last_sample: Option<RawLocationSample>,
    failing_status_calls: u32,
    reject_samples: bool,
    ingested: u64,
}

/// Engine that matches samples to the primary route geometry.
#[derive(Debug, Default)]
pub struct SimulatedEngine {
    config: SimulatedEngineConfig,
    state: Mutex<EngineState>,
}

/// Nearest point of the route to a sample.
#[derive(Debug, Clone, Copy)]
struct Projection {
    leg_index: usize,
    segment_index: usize,
    point: GeoPoint,
    /// Meters from the sample to `point`.
    offset_m: f64,
    /// Meters along the route up to `point`.
    along_m: f64,
    bearing_deg: f64,
}

impl SimulatedEngine {
    /// Create an engine with the given tuning.
    pub fn new(config: SimulatedEngineConfig) -> Self {
        Self {
            config,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Make the next `count` status calls fail.
    pub fn fail_next_status_calls(&self, count: u32) {
        self.state.lock().failing_status_calls = count;
    }

    /// Reject every ingested sample while `reject` is set.
    pub fn set_reject_samples(&self, reject: bool) {
        self.state.lock().reject_samples = reject;
    }

    /// Samples accepted so far.
    pub fn ingested_count(&self) -> u64 {
        self.state.lock().ingested
    }

    fn compute_status(&self) -> Result<NavigationStatus, EngineError> {
        let mut state = self.state.lock();
        if state.failing_status_calls > 0 {
            state.failing_status_calls -= 1;
            return Err(EngineError::Status("simulated failure".to_string()));
        }
        let sample = state
            .last_sample
            .ok_or_else(|| EngineError::Status("no location ingested".to_string()))?;

        let Some(route) = state.routes.first() else {
            return Ok(NavigationStatus::free_drive(raw_location(&sample)));
        };
        let Some(projection) = project(route, &sample.point) else {
            return Ok(NavigationStatus::free_drive(raw_location(&sample)));
        };

        let total_m: f64 = route.legs.iter().map(|l| l.length_m()).sum();
        let remaining_m = (total_m - projection.along_m).max(0.0);
        let off_route = projection.offset_m > self.config.off_route_threshold_m;
        let route_state = if off_route {
            RouteProgressState::OffRoute
        } else if remaining_m <= self.config.arrival_threshold_m {
            RouteProgressState::Complete
        } else {
            RouteProgressState::Tracking
        };

        let leg = &route.legs[projection.leg_index];
        let road_class = leg
            .intersections()
            .filter(|i| i.geometry_index <= projection.segment_index)
            .filter_map(|i| i.road_class)
            .last();
        let step_index = leg
            .steps
            .iter()
            .rposition(|s| {
                s.intersections
                    .first()
                    .is_some_and(|i| i.geometry_index <= projection.segment_index)
            })
            .unwrap_or(0);

        let speed = sample.speed_mps.filter(|s| *s > 0.5).unwrap_or(FALLBACK_SPEED_MPS);
        let location = EnhancedLocation {
            point: if off_route { sample.point } else { projection.point },
            bearing_deg: if off_route {
                sample.bearing_deg.unwrap_or(projection.bearing_deg)
            } else {
                projection.bearing_deg
            },
            speed_mps: sample.speed_mps,
            road: RoadAttribution {
                name: None,
                road_class,
                speed_limit_kph: road_class.map(speed_limit_kph),
            },
            off_road: off_route,
            timestamp_ms: sample.timestamp_ms,
        };
        trace!(
            leg = projection.leg_index,
            segment = projection.segment_index,
            offset_m = projection.offset_m,
            remaining_m,
            "Matched sample to route"
        );

        let cues = InstructionCues {
            route_id: route.id.clone(),
            leg_index: projection.leg_index,
            step_index,
            banner: leg.steps.get(step_index).and_then(|s| s.instruction.clone()),
            voice: leg.steps.get(step_index + 1).and_then(|s| s.instruction.clone()),
        };

        Ok(NavigationStatus {
            location,
            route_state,
            cues: (!cues.is_empty()).then_some(cues),
            progress: Some(ProgressReport {
                route_id: route.id.clone(),
                leg_index: projection.leg_index,
                step_index,
                leg_geometry_index: projection.segment_index,
                distance_traveled_m: projection.along_m,
                distance_remaining_m: remaining_m,
                duration_remaining_s: remaining_m / speed,
            }),
        })
    }
}

impl MapMatchingEngine for SimulatedEngine {
    fn ingest(&self, sample: &RawLocationSample) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.reject_samples {
            return Err(EngineError::Ingest("simulated rejection".to_string()));
        }
        state.last_sample = Some(*sample);
        state.ingested += 1;
        Ok(())
    }

    fn status(&self) -> BoxFuture<'_, Result<NavigationStatus, EngineError>> {
        Box::pin(async move {
            if !self.config.status_delay.is_zero() {
                tokio::time::sleep(self.config.status_delay).await;
            }
            self.compute_status()
        })
    }

    fn set_routes(&self, routes: &[NavigationRoute]) -> Result<(), EngineError> {
        if let Some(bad) = routes.iter().find(|r| r.legs.iter().any(|l| l.geometry.len() < 2)) {
            return Err(EngineError::RoutesRejected(format!(
                "route {} has a leg without geometry",
                bad.id
            )));
        }
        debug!(count = routes.len(), "Engine routes updated");
        self.state.lock().routes = routes.to_vec();
        Ok(())
    }
}

/// Typical posted limit for a road class, in km/h.
pub(crate) fn speed_limit_kph(class: RoadClass) -> f64 {
    match class {
        RoadClass::Motorway => 110.0,
        RoadClass::Trunk => 90.0,
        RoadClass::Primary => 70.0,
        RoadClass::Secondary => 60.0,
        RoadClass::Tertiary => 50.0,
        RoadClass::Street => 40.0,
        RoadClass::Service => 20.0,
        RoadClass::Ferry => 20.0,
    }
}

fn raw_location(sample: &RawLocationSample) -> EnhancedLocation {
    EnhancedLocation {
        point: sample.point,
        bearing_deg: sample.bearing_deg.unwrap_or(0.0),
        speed_mps: sample.speed_mps,
        road: RoadAttribution::default(),
        off_road: false,
        timestamp_ms: sample.timestamp_ms,
    }
}

/// Project `point` onto the closest segment of any leg of `route`.
fn project(route: &NavigationRoute, point: &GeoPoint) -> Option<Projection> {
    let mut best: Option<Projection> = None;
    let mut leg_start_m = 0.0;

    for (leg_index, leg) in route.legs.iter().enumerate() {
        let mut segment_start_m = leg_start_m;
        for (segment_index, pair) in leg.geometry.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            let segment_m = a.distance_to(&b);
            let t = project_fraction(&a, &b, point);
            let snapped = GeoPoint::new(
                a.latitude + (b.latitude - a.latitude) * t,
                a.longitude + (b.longitude - a.longitude) * t,
            );
            let offset_m = snapped.distance_to(point);
            if best.map_or(true, |p| offset_m < p.offset_m) {
                best = Some(Projection {
                    leg_index,
                    segment_index,
                    point: snapped,
                    offset_m,
                    along_m: segment_start_m + segment_m * t,
                    bearing_deg: a.bearing_to(&b),
                });
            }
            segment_start_m += segment_m;
        }
        leg_start_m += leg.length_m();
    }
    best
}

/// Fraction along `a -> b` of the point closest to `p`, clamped to 0..=1.
fn project_fraction(a: &GeoPoint, b: &GeoPoint, p: &GeoPoint) -> f64 {
    let cos_lat = a.latitude.to_radians().cos();
    let to_xy = |g: &GeoPoint| {
        (
            (g.longitude - a.longitude).to_radians() * cos_lat * EARTH_RADIUS_M,
            (g.latitude - a.latitude).to_radians() * EARTH_RADIUS_M,
        )
    };
    let (bx, by) = to_xy(b);
    let (px, py) = to_xy(p);
    let len2 = bx * bx + by * by;
    if len2 <= f64::EPSILON {
        return 0.0;
    }
    ((px * bx + py * by) / len2).clamp(0.0, 1.0)
}
