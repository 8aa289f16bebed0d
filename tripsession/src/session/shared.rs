//! State shared between the session API and its worker.
//!
//! # Locking
//!
//! Two locks, always taken in this order:
//!
//! 1. the hub's dispatch lock (reentrant), held across every publish and
//!    every state transition so deliveries follow the order of changes
//! 2. `facts`, held only while reading or updating fields and never
//!    while an observer runs
//!
//! Because the dispatch lock is reentrant, an observer may call back into
//! the session (including `stop()`) from inside a delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::engine::{LiveTrafficSignal, NavigationStatus, ProgressReport};
use crate::metrics::SessionMetrics;
use crate::model::{
    GeoPoint, NavigationPhase, NavigationRoute, RawLocationSample, RouteProgress,
    RouteProgressState, SessionState,
};
use crate::observer::ObserverHub;
use crate::phase::{NavigationPhaseStateMachine, PhaseConfig, PhaseInputs};
use crate::traffic::TrafficCongestionSmoother;

/// Inputs and derived state owned by the session.
#[derive(Debug)]
struct SessionFacts {
    session_state: SessionState,
    destination: Option<GeoPoint>,
    routes: Vec<NavigationRoute>,
    guidance_started: bool,
    arrived: bool,
    phase: NavigationPhaseStateMachine,
}

impl SessionFacts {
    fn phase_inputs(&self) -> PhaseInputs {
        PhaseInputs {
            has_destination: self.destination.is_some(),
            has_routes: !self.routes.is_empty(),
            guidance_started: self.guidance_started,
            arrived: self.arrived,
        }
    }
}

/// What a tick may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickScope {
    /// Location, off-route, cues, progress and phase.
    Full,
    /// Location only.
    LocationOnly,
}

pub(crate) struct SessionCore {
    hub: ObserverHub,
    metrics: Arc<SessionMetrics>,
    generation: AtomicU64,
    route_epoch: AtomicU64,
    facts: Mutex<SessionFacts>,
    smoother: TrafficCongestionSmoother,
    traffic: Option<Arc<dyn LiveTrafficSignal>>,
}

impl SessionCore {
    pub(crate) fn new(
        phase: PhaseConfig,
        smoother: TrafficCongestionSmoother,
        traffic: Option<Arc<dyn LiveTrafficSignal>>,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        let hub = ObserverHub::new();
        // Seed lifecycle caches so early observers learn the initial state.
        hub.session_state().publish(SessionState::Stopped);
        hub.navigation_phase().publish(NavigationPhase::FreeDrive);

        Self {
            hub,
            metrics,
            generation: AtomicU64::new(0),
            route_epoch: AtomicU64::new(0),
            facts: Mutex::new(SessionFacts {
                session_state: SessionState::Stopped,
                destination: None,
                routes: Vec::new(),
                guidance_started: false,
                arrived: false,
                phase: NavigationPhaseStateMachine::new(phase),
            }),
            smoother,
            traffic,
        }
    }

    pub(crate) fn hub(&self) -> &ObserverHub {
        &self.hub
    }

    pub(crate) fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    // ─── Generation and epoch ────────────────────────────────────────────

    /// Invalidate every tick started before this call.
    pub(crate) fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn route_epoch(&self) -> u64 {
        self.route_epoch.load(Ordering::SeqCst)
    }

    /// Whether a tick of `generation` may still publish. Counts a discard.
    fn is_current(&self, generation: u64) -> bool {
        let current = self.generation.load(Ordering::SeqCst) == generation;
        if !current {
            debug!(generation, "Discarding result of a stopped session");
            self.metrics.stale_result_discarded();
        }
        current
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    pub(crate) fn session_state(&self) -> SessionState {
        self.facts.lock().session_state
    }

    pub(crate) fn navigation_phase(&self) -> NavigationPhase {
        self.facts.lock().phase.current()
    }

    pub(crate) fn destination(&self) -> Option<GeoPoint> {
        self.facts.lock().destination
    }

    pub(crate) fn routes(&self) -> Vec<NavigationRoute> {
        self.facts.lock().routes.clone()
    }

    pub(crate) fn guidance_started(&self) -> bool {
        self.facts.lock().guidance_started
    }

    // ─── Transitions (caller holds the dispatch lock) ────────────────────

    /// Record and publish a lifecycle state.
    pub(crate) fn set_session_state(&self, state: SessionState) {
        {
            let mut facts = self.facts.lock();
            if facts.session_state == state {
                return;
            }
            facts.session_state = state;
        }
        info!(state = %state, "Trip session state changed");
        self.hub.session_state().publish(state);
    }

    /// Replace the active routes. Progress for the old routes is dropped.
    pub(crate) fn set_routes(&self, routes: Vec<NavigationRoute>) {
        let count = routes.len();
        {
            let mut facts = self.facts.lock();
            facts.routes = routes;
            facts.arrived = false;
        }
        self.route_epoch.fetch_add(1, Ordering::SeqCst);
        self.hub.route_progress().clear_last();
        self.hub.instruction_cues().clear_last();
        debug!(count, "Active routes replaced");
        self.recompute_phase();
    }

    /// Stopping guidance also drops the arrival fact; a held Arrival phase
    /// stays until the destination or the routes are cleared.
    pub(crate) fn set_guidance_started(&self, started: bool) {
        {
            let mut facts = self.facts.lock();
            facts.guidance_started = started;
            if !started {
                facts.arrived = false;
            }
        }
        self.recompute_phase();
    }

    pub(crate) fn set_destination(&self, destination: Option<GeoPoint>) {
        self.facts.lock().destination = destination;
        self.recompute_phase();
    }

    /// Feed current facts to the phase machine and publish a change.
    pub(crate) fn recompute_phase(&self) {
        let update = {
            let mut facts = self.facts.lock();
            let inputs = facts.phase_inputs();
            facts.phase.update(inputs)
        };
        if update.invalid {
            self.metrics.invalid_phase_transition();
        }
        if update.changed {
            info!(phase = %update.phase, "Navigation phase changed");
            self.hub.navigation_phase().publish(update.phase);
        }
    }

    // ─── Tick results ────────────────────────────────────────────────────

    /// Publish a raw sample unless the session has moved on.
    pub(crate) fn publish_raw(&self, generation: u64, sample: RawLocationSample) {
        let _dispatch = self.hub.dispatch_lock().lock();
        if self.is_current(generation) {
            self.hub.raw_location().publish(sample);
        }
    }

    /// Publish the results of one tick. Returns whether the location was
    /// delivered, i.e. the tick was not discarded as stale.
    ///
    /// `epoch` is the route epoch the status was requested under; route
    /// data for an older epoch is dropped. Every publish re-checks the
    /// generation because an observer may stop the session mid-tick.
    ///
    /// With `scope` set to [`TickScope::LocationOnly`] only the location is
    /// published; route tracking waits for the first regular tick.
    pub(crate) fn apply_status(
        &self,
        generation: u64,
        epoch: u64,
        status: NavigationStatus,
        scope: TickScope,
    ) -> bool {
        let _dispatch = self.hub.dispatch_lock().lock();
        if !self.is_current(generation) {
            return false;
        }

        let off_route = status.is_off_route();
        self.hub.location().publish(status.location);
        if scope == TickScope::LocationOnly {
            return true;
        }

        if !self.is_current(generation) {
            return true;
        }
        if self.hub.off_route().last() != Some(off_route) {
            info!(off_route, "Off-route state changed");
            self.hub.off_route().publish(off_route);
        }

        if (status.progress.is_some() || status.cues.is_some()) && epoch != self.route_epoch() {
            debug!("Routes changed while status was pending, dropping route data");
            self.metrics.stale_result_discarded();
            return true;
        }

        if let Some(cues) = status.cues {
            if !self.is_current(generation) {
                return true;
            }
            if self.hub.instruction_cues().last().as_ref() != Some(&cues) {
                debug!(step = cues.step_index, banner = ?cues.banner, "Instruction cues changed");
                self.hub.instruction_cues().publish(cues);
            }
        }

        let Some(progress) = status
            .progress
            .and_then(|report| self.build_progress(report, status.route_state))
        else {
            return true;
        };

        if !self.is_current(generation) {
            return true;
        }
        let arrived = progress.is_complete();
        debug!(
            state = ?progress.state,
            leg = progress.leg_index,
            remaining_m = progress.distance_remaining_m,
            "Route progress"
        );
        self.hub.route_progress().publish(progress);

        if !self.is_current(generation) {
            return true;
        }
        {
            // Arrival only counts while guidance runs.
            let mut facts = self.facts.lock();
            facts.arrived = arrived && facts.guidance_started;
        }
        self.recompute_phase();
        true
    }

    /// Turn an engine report into published progress, smoothing the
    /// current leg's congestion first.
    fn build_progress(
        &self,
        report: ProgressReport,
        state: RouteProgressState,
    ) -> Option<RouteProgress> {
        let mut facts = self.facts.lock();
        let route = facts.routes.iter_mut().find(|r| r.id == report.route_id)?;
        let thresholds = *self.smoother.thresholds();

        let congestion = match route.legs.get_mut(report.leg_index) {
            Some(leg) => {
                let start = report.leg_geometry_index;
                if let Some(signal) = &self.traffic {
                    let near_end = (start + self.smoother.config().near_segments)
                        .min(leg.congestion_numeric.len());
                    if start < near_end {
                        if let Some(expected) = signal.expected_congestion(leg, start..near_end) {
                            if self.smoother.apply_to_leg(leg, start, expected) {
                                self.metrics.congestion_rewrite();
                            }
                        }
                    }
                }
                let from = start.min(leg.congestion_numeric.len());
                thresholds.classify(&leg.congestion_numeric[from..], from)
            }
            None => Vec::new(),
        };

        Some(RouteProgress {
            route_id: report.route_id,
            state,
            leg_index: report.leg_index,
            step_index: report.step_index,
            leg_geometry_index: report.leg_geometry_index,
            distance_traveled_m: report.distance_traveled_m,
            distance_remaining_m: report.distance_remaining_m,
            duration_remaining_s: report.duration_remaining_s,
            congestion,
        })
    }
}

impl std::fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCore")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("route_epoch", &self.route_epoch.load(Ordering::Relaxed))
            .field("facts", &*self.facts.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EnhancedLocation, InstructionCues, RoadAttribution};

    fn core() -> SessionCore {
        SessionCore::new(
            PhaseConfig::default(),
            TrafficCongestionSmoother::default(),
            None,
            Arc::new(SessionMetrics::new()),
        )
    }

    fn status_at(timestamp_ms: u64, step_index: usize) -> NavigationStatus {
        let location = EnhancedLocation {
            point: GeoPoint::new(0.0005, 0.0),
            bearing_deg: 0.0,
            speed_mps: None,
            road: RoadAttribution::default(),
            off_road: false,
            timestamp_ms,
        };
        NavigationStatus {
            cues: Some(InstructionCues {
                route_id: "r1".to_string(),
                leg_index: 0,
                step_index,
                banner: Some("Head north".to_string()),
                voice: None,
            }),
            ..NavigationStatus::free_drive(location)
        }
    }

    #[test]
    fn test_stale_generation_publishes_nothing() {
        let core = core();
        let generation = core.advance_generation();
        core.advance_generation();

        let epoch = core.route_epoch();
        assert!(!core.apply_status(generation, epoch, status_at(1, 0), TickScope::Full));
        assert!(core.hub().location().last().is_none());
        assert_eq!(core.metrics().snapshot().stale_results_discarded, 1);
    }

    #[test]
    fn test_location_only_scope_skips_route_data() {
        let core = core();
        let generation = core.advance_generation();

        let epoch = core.route_epoch();
        assert!(core.apply_status(generation, epoch, status_at(1, 0), TickScope::LocationOnly));
        assert_eq!(core.hub().location().last().map(|l| l.timestamp_ms), Some(1));
        assert!(core.hub().off_route().last().is_none());
        assert!(core.hub().instruction_cues().last().is_none());
    }

    #[test]
    fn test_cues_published_on_change_only() {
        let core = core();
        let generation = core.advance_generation();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        core.hub()
            .instruction_cues()
            .register(Arc::new(move |c: &InstructionCues| {
                sink.lock().push(c.step_index)
            }));

        let epoch = core.route_epoch();
        assert!(core.apply_status(generation, epoch, status_at(1, 0), TickScope::Full));
        assert!(core.apply_status(generation, epoch, status_at(2, 0), TickScope::Full));
        assert!(core.apply_status(generation, epoch, status_at(3, 1), TickScope::Full));
        assert_eq!(*seen.lock(), vec![0, 1]);

        // Cues computed before a route change are dropped.
        core.set_routes(Vec::new());
        assert!(core.apply_status(generation, epoch, status_at(4, 2), TickScope::Full));
        assert_eq!(*seen.lock(), vec![0, 1]);
        assert!(core.hub().instruction_cues().last().is_none());
    }

    #[test]
    fn test_guidance_off_drops_arrival_fact() {
        let core = core();
        core.set_destination(Some(GeoPoint::new(0.01, 0.0)));
        core.set_routes(vec![NavigationRoute::new("r1", Vec::new())]);
        core.set_guidance_started(true);
        core.facts.lock().arrived = true;
        core.recompute_phase();
        assert_eq!(core.navigation_phase(), NavigationPhase::Arrival);

        core.set_guidance_started(false);
        core.set_destination(Some(GeoPoint::new(0.02, 0.0)));
        core.set_guidance_started(false);

        // The latch holds and nothing contradictory was fed to the machine.
        assert_eq!(core.navigation_phase(), NavigationPhase::Arrival);
        assert_eq!(core.metrics().snapshot().invalid_phase_transitions, 0);
    }
}
