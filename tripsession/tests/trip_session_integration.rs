//! Integration tests for the trip session.
//!
//! These tests drive a complete session on a multi-threaded runtime:
//! - Lifecycle idempotence and observer replay
//! - Tick results, engine failures and stale-result discarding
//! - Startup tick from the last known fix
//! - Navigation phase scenarios end to end
//! - Instruction cues per step
//! - Congestion smoothing through live ticks
//!
//! Run with: `cargo test --test trip_session_integration`

use std::ops::Range;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use tripsession::engine::{
    LiveTrafficSignal, ManualLocationSource, SimulatedEngine, SimulatedEngineConfig,
};
use tripsession::model::{
    EnhancedLocation, GeoPoint, InstructionCues, Intersection, NavigationPhase, NavigationRoute,
    RawLocationSample, RoadClass, RouteLeg, RouteProgress, RouteStep, SessionState, SeverityBand,
};
use tripsession::observer::ObserverRef;
use tripsession::poller::{PollerConfig, TickPolicy};
use tripsession::{TripSession, TripSessionConfig};

// ============================================================================
// Helper Functions
// ============================================================================

struct Harness {
    session: Arc<TripSession>,
    source: Arc<ManualLocationSource>,
    engine: Arc<SimulatedEngine>,
}

fn harness_with(
    config: TripSessionConfig,
    engine: SimulatedEngine,
    traffic: Option<Arc<dyn LiveTrafficSignal>>,
) -> Harness {
    let source = Arc::new(ManualLocationSource::new());
    let engine = Arc::new(engine);
    let session = Arc::new(TripSession::new(
        config,
        engine.clone(),
        source.clone(),
        traffic,
        tokio::runtime::Handle::current(),
    ));
    Harness {
        session,
        source,
        engine,
    }
}

fn harness() -> Harness {
    harness_with(TripSessionConfig::default(), SimulatedEngine::default(), None)
}

/// Observer that records every value it receives.
fn recorder<T: Clone + Send + Sync + 'static>() -> (Arc<Mutex<Vec<T>>>, ObserverRef<T>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: ObserverRef<T> = Arc::new(move |v: &T| sink.lock().push(v.clone()));
    (seen, observer)
}

/// Straight route north from the origin, ~111 m per segment, on a primary road.
fn straight_route(id: &str, segments: usize) -> NavigationRoute {
    let geometry = (0..=segments)
        .map(|i| GeoPoint::new(i as f64 * 0.001, 0.0))
        .collect();
    NavigationRoute::new(
        id,
        vec![RouteLeg {
            geometry,
            congestion_numeric: vec![10; segments],
            steps: vec![RouteStep {
                instruction: Some("Head north".to_string()),
                intersections: vec![Intersection::new(0, Some(RoadClass::Primary))],
            }],
            congestion_override: None,
        }],
    )
}

fn sample_at(latitude: f64, timestamp_ms: u64) -> RawLocationSample {
    RawLocationSample::new(GeoPoint::new(latitude, 0.0), timestamp_ms).with_speed(10.0)
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Live traffic signal that always reports the same value.
struct FixedSignal(u8);

impl LiveTrafficSignal for FixedSignal {
    fn expected_congestion(&self, _leg: &RouteLeg, _segments: Range<usize>) -> Option<u8> {
        Some(self.0)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_stop_idempotent() {
    let h = harness();
    let (states, observer) = recorder::<SessionState>();
    h.session.register_session_state_observer(observer);

    h.session.start().unwrap();
    h.session.start().unwrap();
    h.session.stop();
    h.session.stop();

    assert_eq!(
        *states.lock(),
        vec![
            SessionState::Stopped,
            SessionState::Started,
            SessionState::Stopped
        ]
    );
    assert_eq!(h.source.start_count(), 1);
    assert_eq!(h.source.stop_count(), 1);
    assert_eq!(h.session.metrics().sessions_started, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_after_stop() {
    let h = harness();
    h.session.start().unwrap();
    h.session.stop();
    h.session.start().unwrap();

    h.source.push(sample_at(0.0005, 1));
    assert!(wait_until(|| h.session.location().is_some()).await);
    assert_eq!(h.session.metrics().sessions_started, 2);
}

// ============================================================================
// Ticks and Replay
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_observer_gets_last_location() {
    let h = harness();
    h.session.start().unwrap();
    h.source.push(sample_at(0.0005, 11));
    assert!(wait_until(|| h.session.location().is_some()).await);

    let (seen, observer) = recorder::<EnhancedLocation>();
    h.session.register_location_observer(observer);

    // Delivered before register returned.
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].timestamp_ms, 11);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_raw_location_precedes_matched_location() {
    let h = harness();
    let order = Arc::new(Mutex::new(Vec::new()));
    let (raw_order, loc_order) = (Arc::clone(&order), Arc::clone(&order));
    let _raw = h
        .session
        .observers()
        .raw_location()
        .subscribe(Arc::new(move |_: &RawLocationSample| raw_order.lock().push("raw")));
    let _loc = h
        .session
        .observers()
        .location()
        .subscribe(Arc::new(move |_: &EnhancedLocation| loc_order.lock().push("location")));

    h.session.start().unwrap();
    h.source.push(sample_at(0.0005, 1));
    assert!(wait_until(|| order.lock().len() >= 2).await);
    assert_eq!(*order.lock(), vec!["raw", "location"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_published_with_routes() {
    let h = harness();
    let (progress, observer) = recorder::<RouteProgress>();
    h.session.register_route_progress_observer(observer);
    h.session
        .set_active_routes(vec![straight_route("r1", 10)])
        .unwrap();

    h.session.start().unwrap();
    h.source.push(sample_at(0.0025, 1));
    assert!(wait_until(|| !progress.lock().is_empty()).await);

    let p = progress.lock()[0].clone();
    assert_eq!(p.route_id, "r1");
    assert_eq!(p.leg_geometry_index, 2);
    assert_eq!(p.congestion.len(), 8);
    assert!(p.distance_remaining_m > 800.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_failure_keeps_previous_state() {
    let h = harness();
    let (seen, observer) = recorder::<EnhancedLocation>();
    h.session.register_location_observer(observer);
    h.session.start().unwrap();

    h.source.push(sample_at(0.0005, 1));
    assert!(wait_until(|| seen.lock().len() == 1).await);

    h.engine.fail_next_status_calls(1);
    h.source.push(sample_at(0.0006, 2));
    assert!(wait_until(|| h.session.metrics().engine_status_failures == 1).await);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(h.session.location().unwrap().timestamp_ms, 1);

    h.source.push(sample_at(0.0007, 3));
    assert!(wait_until(|| seen.lock().len() == 2).await);
    assert_eq!(h.session.location().unwrap().timestamp_ms, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_positioning_error_is_counted_not_fatal() {
    let h = harness();
    h.session.start().unwrap();
    h.source
        .push_error(tripsession::PositioningError::Source("no fix".to_string()));
    h.source.push(sample_at(0.0005, 5));

    assert!(wait_until(|| h.session.location().is_some()).await);
    assert_eq!(h.session.metrics().ingestion_failures, 1);
    assert_eq!(h.session.state(), SessionState::Started);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_observer_does_not_block_others() {
    let h = harness();
    h.session
        .register_location_observer(Arc::new(|_: &EnhancedLocation| panic!("bad observer")));
    let (seen, observer) = recorder::<EnhancedLocation>();
    h.session.register_location_observer(observer);

    h.session.start().unwrap();
    h.source.push(sample_at(0.0005, 1));
    assert!(wait_until(|| seen.lock().len() == 1).await);
    assert_eq!(h.session.metrics().observer_failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fixed_cadence_repeats_last_sample() {
    let config = TripSessionConfig::default().with_poller(PollerConfig {
        tick_policy: TickPolicy::FixedCadence(Duration::from_millis(20)),
        ..PollerConfig::default()
    });
    let h = harness_with(config, SimulatedEngine::default(), None);
    let (seen, observer) = recorder::<EnhancedLocation>();
    h.session.register_location_observer(observer);

    h.session.start().unwrap();
    h.source.push(sample_at(0.0005, 1));
    assert!(wait_until(|| seen.lock().len() >= 3).await);
    assert!(seen.lock().iter().all(|l| l.timestamp_ms == 1));
    assert_eq!(h.session.metrics().samples_received, 1);
}

// ============================================================================
// Startup Tick
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_publishes_last_known_fix() {
    let h = harness();
    h.session
        .set_active_routes(vec![straight_route("r1", 10)])
        .unwrap();
    let (locations, observer) = recorder::<EnhancedLocation>();
    h.session.register_location_observer(observer);
    h.source.set_last_known(Some(sample_at(0.0005, 9)));

    h.session.start().unwrap();

    assert!(wait_until(|| !locations.lock().is_empty()).await);
    assert_eq!(locations.lock()[0].timestamp_ms, 9);
    assert_eq!(h.session.raw_location().unwrap().timestamp_ms, 9);
    assert!(h.session.route_progress().is_none());
    assert!(h.session.observers().off_route().last().is_none());
    assert!(wait_until(|| h.session.metrics().ticks == 1).await);

    // Progress starts with the first regular tick.
    h.source.push(sample_at(0.0006, 10));
    assert!(wait_until(|| h.session.route_progress().is_some()).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_without_any_fix_is_quiet() {
    let h = harness();
    let (locations, observer) = recorder::<EnhancedLocation>();
    h.session.register_location_observer(observer);

    h.session.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(locations.lock().is_empty());
    let metrics = h.session.metrics();
    assert_eq!(metrics.ticks, 0);
    assert_eq!(metrics.engine_status_failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_republishes_engine_location() {
    let h = harness();
    h.session.start().unwrap();
    h.source.push(sample_at(0.0005, 1));
    assert!(wait_until(|| h.session.location().is_some()).await);
    h.session.stop();
    h.source.set_last_known(None);
    assert!(h.session.location().is_none());

    h.session.start().unwrap();
    assert!(wait_until(|| h.session.location().is_some()).await);
    assert_eq!(h.session.location().unwrap().timestamp_ms, 1);
}

// ============================================================================
// Stop Boundary
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_delivery_after_stop() {
    let engine = SimulatedEngine::new(SimulatedEngineConfig {
        status_delay: Duration::from_millis(150),
        ..SimulatedEngineConfig::default()
    });
    let h = harness_with(TripSessionConfig::default(), engine, None);
    let (seen, observer) = recorder::<EnhancedLocation>();
    h.session.register_location_observer(observer);

    h.session.start().unwrap();
    h.source.push(sample_at(0.0005, 1));
    assert!(wait_until(|| h.engine.ingested_count() == 1).await);

    // Status call is in flight.
    h.session.stop();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(seen.lock().is_empty());
    assert!(h.session.location().is_none());
    assert_eq!(h.session.metrics().ticks, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_from_observer_discards_rest_of_tick() {
    let h = harness();
    h.session
        .set_active_routes(vec![straight_route("r1", 10)])
        .unwrap();
    let (progress, progress_observer) = recorder::<RouteProgress>();
    h.session.register_route_progress_observer(progress_observer);

    let weak: Weak<TripSession> = Arc::downgrade(&h.session);
    h.session
        .register_location_observer(Arc::new(move |_: &EnhancedLocation| {
            if let Some(session) = weak.upgrade() {
                session.stop();
            }
        }));

    h.session.start().unwrap();
    h.source.push(sample_at(0.0025, 1));
    assert!(wait_until(|| h.session.state() == SessionState::Stopped).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(progress.lock().is_empty());
    assert!(h.session.metrics().stale_results_discarded >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_progress_for_replaced_routes_is_dropped() {
    let engine = SimulatedEngine::new(SimulatedEngineConfig {
        status_delay: Duration::from_millis(150),
        ..SimulatedEngineConfig::default()
    });
    let h = harness_with(TripSessionConfig::default(), engine, None);
    h.session
        .set_active_routes(vec![straight_route("r1", 10)])
        .unwrap();
    let (progress, observer) = recorder::<RouteProgress>();
    h.session.register_route_progress_observer(observer);

    h.session.start().unwrap();
    h.source.push(sample_at(0.0025, 1));
    assert!(wait_until(|| h.engine.ingested_count() == 1).await);
    h.session
        .set_active_routes(vec![straight_route("r2", 10)])
        .unwrap();

    assert!(wait_until(|| h.session.location().is_some()).await);
    assert!(progress.lock().is_empty());
    assert_eq!(h.session.metrics().stale_results_discarded, 1);
}

// ============================================================================
// Navigation Phase
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_free_drive_without_destination_or_routes() {
    let h = harness();
    h.session.set_destination(None);
    h.session.set_active_routes(Vec::new()).unwrap();
    assert_eq!(h.session.navigation_phase(), NavigationPhase::FreeDrive);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_route_preview_before_guidance() {
    let h = harness();
    h.session.set_destination(Some(GeoPoint::new(0.01, 0.0)));
    h.session
        .set_active_routes(vec![straight_route("r1", 10)])
        .unwrap();
    h.session.set_active_guidance_started(false);
    assert_eq!(h.session.navigation_phase(), NavigationPhase::RoutePreview);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_arrival_then_destination_cleared() {
    let h = harness();
    let (phases, observer) = recorder::<NavigationPhase>();
    h.session.register_navigation_phase_observer(observer);

    let route = straight_route("r1", 4);
    h.session.set_destination(route.destination());
    h.session.set_active_routes(vec![route]).unwrap();
    h.session.set_active_guidance_started(true);
    h.session.start().unwrap();

    h.source.push(sample_at(0.004, 1));
    assert!(wait_until(|| h.session.navigation_phase() == NavigationPhase::Arrival).await);

    // A later progress update away from the end does not leave Arrival.
    h.source.push(sample_at(0.0035, 2));
    assert!(wait_until(|| h.session.metrics().ticks >= 2).await);
    assert_eq!(h.session.navigation_phase(), NavigationPhase::Arrival);

    h.session.set_destination(None);
    assert_eq!(h.session.navigation_phase(), NavigationPhase::FreeDrive);
    assert_eq!(
        *phases.lock(),
        vec![
            NavigationPhase::FreeDrive,
            NavigationPhase::RoutePreview,
            NavigationPhase::ActiveGuidance,
            NavigationPhase::Arrival,
            NavigationPhase::FreeDrive,
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_guidance_off_after_arrival_is_not_contradictory() {
    let h = harness();
    let route = straight_route("r1", 4);
    h.session.set_destination(route.destination());
    h.session.set_active_routes(vec![route]).unwrap();
    h.session.set_active_guidance_started(true);
    h.session.start().unwrap();

    h.source.push(sample_at(0.004, 1));
    assert!(wait_until(|| h.session.navigation_phase() == NavigationPhase::Arrival).await);

    h.session.set_active_guidance_started(false);
    h.session.set_destination(Some(GeoPoint::new(0.004, 0.0)));
    h.source.push(sample_at(0.004, 2));
    assert!(wait_until(|| h.session.metrics().ticks >= 2).await);
    assert_eq!(h.session.navigation_phase(), NavigationPhase::Arrival);

    // Replacing the routes does not start a new trip; only clearing does.
    h.session
        .set_active_routes(vec![straight_route("r2", 8)])
        .unwrap();
    assert_eq!(h.session.navigation_phase(), NavigationPhase::Arrival);
    h.session.set_active_routes(Vec::new()).unwrap();
    assert_eq!(h.session.navigation_phase(), NavigationPhase::FreeDrive);

    assert_eq!(h.session.metrics().invalid_phase_transitions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_off_route_published_on_change() {
    let h = harness();
    let (flags, observer) = recorder::<bool>();
    let _sub = h.session.observers().off_route().subscribe(observer);
    h.session
        .set_active_routes(vec![straight_route("r1", 10)])
        .unwrap();
    h.session.start().unwrap();

    h.source.push(sample_at(0.0005, 1));
    assert!(wait_until(|| flags.lock().len() == 1).await);
    h.source.push(sample_at(0.0006, 2));
    assert!(wait_until(|| h.session.metrics().ticks >= 2).await);
    h.source.push(RawLocationSample::new(GeoPoint::new(0.0007, 0.01), 3));
    assert!(wait_until(|| flags.lock().len() == 2).await);

    assert_eq!(*flags.lock(), vec![false, true]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_while_off_route_reports_back_on_route() {
    let h = harness();
    let (flags, observer) = recorder::<bool>();
    let _sub = h.session.observers().off_route().subscribe(observer);
    h.session
        .set_active_routes(vec![straight_route("r1", 10)])
        .unwrap();
    h.session.start().unwrap();

    h.source.push(sample_at(0.0005, 1));
    h.source.push(RawLocationSample::new(GeoPoint::new(0.0007, 0.01), 2));
    assert!(wait_until(|| flags.lock().last() == Some(&true)).await);

    h.session.stop();
    assert_eq!(flags.lock().last(), Some(&false));
    assert!(h.session.observers().off_route().last().is_none());

    // A stop from the on-route state adds nothing.
    let before = flags.lock().len();
    h.session.start().unwrap();
    h.source.push(sample_at(0.0008, 3));
    assert!(wait_until(|| flags.lock().len() == before + 1).await);
    h.session.stop();
    assert_eq!(flags.lock().len(), before + 1);
}

// ============================================================================
// Instruction Cues
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cues_published_once_per_step() {
    let h = harness();
    let mut route = straight_route("r1", 10);
    route.legs[0].steps.push(RouteStep {
        instruction: Some("Take exit 4".to_string()),
        intersections: vec![Intersection::new(5, Some(RoadClass::Primary))],
    });
    h.session.set_active_routes(vec![route]).unwrap();
    let (cues, observer) = recorder::<InstructionCues>();
    h.session.register_instruction_cues_observer(observer);
    h.session.start().unwrap();

    h.source.push(sample_at(0.0025, 1));
    assert!(wait_until(|| cues.lock().len() == 1).await);
    h.source.push(sample_at(0.003, 2));
    assert!(wait_until(|| h.session.metrics().ticks >= 2).await);
    h.source.push(sample_at(0.0065, 3));
    assert!(wait_until(|| cues.lock().len() == 2).await);

    let cues = cues.lock();
    assert_eq!(cues[0].step_index, 0);
    assert_eq!(cues[0].banner.as_deref(), Some("Head north"));
    assert_eq!(cues[0].voice.as_deref(), Some("Take exit 4"));
    assert_eq!(cues[1].step_index, 1);
    assert_eq!(cues[1].banner.as_deref(), Some("Take exit 4"));
    assert!(cues[1].voice.is_none());
    assert_eq!(h.session.instruction_cues().as_ref(), Some(&cues[1]));
}

// ============================================================================
// Congestion Smoothing
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heavy_estimate_raises_light_segments_one_band() {
    let h = harness_with(
        TripSessionConfig::default(),
        SimulatedEngine::default(),
        Some(Arc::new(FixedSignal(70))),
    );
    let (progress, observer) = recorder::<RouteProgress>();
    h.session.register_route_progress_observer(observer);
    h.session
        .set_active_routes(vec![straight_route("r1", 12)])
        .unwrap();

    h.session.start().unwrap();
    h.source.push(sample_at(0.0005, 1));
    assert!(wait_until(|| !progress.lock().is_empty()).await);

    let p = progress.lock()[0].clone();
    assert_eq!(p.congestion[0].value, 40);
    assert_eq!(p.congestion[0].band, SeverityBand::Moderate);
    assert!(p.congestion[..8].iter().all(|s| s.band == SeverityBand::Moderate));
    assert!(p.congestion[8..].iter().all(|s| s.band == SeverityBand::Light));

    let leg = &h.session.active_routes()[0].legs[0];
    assert_eq!(leg.congestion_numeric[0], 40);
    assert_eq!(h.session.metrics().congestion_rewrites, 1);
}
