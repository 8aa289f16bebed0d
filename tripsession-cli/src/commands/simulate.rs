//! Simulate command - replay a synthetic drive through a trip session.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use tracing::{debug, info, warn};
use tripsession::engine::{
    samples_along_route, LiveTrafficSignal, ReplayLocationSource, SimulatedEngine,
    SimulatedEngineConfig, SpeedRatioTrafficSignal,
};
use tripsession::logging::init_logging;
use tripsession::model::{
    EnhancedLocation, GeoPoint, InstructionCues, Intersection, NavigationPhase, NavigationRoute,
    RawLocationSample, RoadClass, RouteLeg, RouteProgress, RouteStep, SessionState,
};
use tripsession::TripSession;

use super::load_config;
use crate::error::CliError;

/// Degrees of latitude per synthetic segment (about 111 m).
const SEGMENT_DEGREES: f64 = 0.001;

/// Congestion annotated on the synthetic route before any live data.
const BASE_CONGESTION: u8 = 10;

/// Distance between replayed samples.
const SAMPLE_SPACING_M: f64 = 25.0;

/// How long to keep ticking after the last sample before giving up on arrival.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Configuration file (INI)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Route file (JSON) to drive instead of the synthetic straight route
    #[arg(long)]
    pub route: Option<PathBuf>,

    /// Number of geometry segments in the synthetic route
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(2..=10_000))]
    pub segments: u32,

    /// Delay between replayed samples, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub interval_ms: u64,

    /// Replayed driving speed, in km/h
    #[arg(long, default_value_t = 50.0)]
    pub speed_kph: f64,

    /// Fixed live congestion estimate (0-100) instead of deriving it from speed
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub congestion: Option<u8>,

    /// Log every location and raw sample
    #[arg(short, long)]
    pub verbose: bool,
}

/// Live traffic signal that always reports the same estimate.
#[derive(Debug)]
struct FixedTrafficSignal(u8);

impl LiveTrafficSignal for FixedTrafficSignal {
    fn expected_congestion(&self, _leg: &RouteLeg, segments: Range<usize>) -> Option<u8> {
        (!segments.is_empty()).then_some(self.0)
    }
}

/// Why the simulation loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Arrived,
    TraceEnded,
    Interrupted,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Arrived => write!(f, "arrived at destination"),
            Outcome::TraceEnded => write!(f, "trace ended before arrival"),
            Outcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_deref())?;
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    let _log_guard = init_logging(&config.logging)?;

    if args.interval_ms == 0 {
        return Err(CliError::Config("--interval-ms must be positive".to_string()));
    }
    if !(args.speed_kph.is_finite() && args.speed_kph > 0.0) {
        return Err(CliError::Config("--speed-kph must be positive".to_string()));
    }

    let route = match &args.route {
        Some(path) => NavigationRoute::load_json(path)?,
        None => synthetic_route(args.segments as usize),
    };
    let destination = route
        .destination()
        .ok_or_else(|| CliError::Config(format!("route '{}' has no geometry", route.id)))?;

    let samples = samples_along_route(&route, SAMPLE_SPACING_M, args.speed_kph / 3.6);
    info!(
        route = %route.id,
        length_m = route.legs.iter().map(RouteLeg::length_m).sum::<f64>().round(),
        samples = samples.len(),
        "Prepared simulated drive"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    let replay = Arc::new(ReplayLocationSource::new(
        samples,
        Duration::from_millis(args.interval_ms),
        runtime.handle().clone(),
    ));
    let trace_done = replay.finished();
    let engine = Arc::new(SimulatedEngine::new(SimulatedEngineConfig::default()));

    let speed_signal = Arc::new(SpeedRatioTrafficSignal::new());
    let signal: Arc<dyn LiveTrafficSignal> = match args.congestion {
        Some(value) => Arc::new(FixedTrafficSignal(value)),
        None => speed_signal.clone(),
    };

    let session = TripSession::new(
        config,
        engine,
        replay,
        Some(signal),
        runtime.handle().clone(),
    );

    let arrived = Arc::new(AtomicBool::new(false));
    let progress_updates = Arc::new(AtomicU64::new(0));
    register_loggers(&session, args.verbose, arrived.clone(), progress_updates.clone());
    if args.congestion.is_none() {
        session.register_location_observer(speed_signal);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping session...");
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    session.set_destination(Some(destination));
    session.set_active_routes(vec![route])?;
    session.set_active_guidance_started(true);
    session.start()?;

    let started = Instant::now();
    let mut trace_ended_at: Option<Instant> = None;
    let outcome = loop {
        if arrived.load(Ordering::SeqCst) {
            break Outcome::Arrived;
        }
        if shutdown.load(Ordering::SeqCst) {
            break Outcome::Interrupted;
        }
        if trace_done.is_cancelled() {
            let ended = *trace_ended_at.get_or_insert_with(Instant::now);
            if ended.elapsed() >= DRAIN_GRACE {
                break Outcome::TraceEnded;
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let final_phase = session.navigation_phase();
    session.stop();
    let elapsed = started.elapsed();
    if outcome != Outcome::Arrived {
        warn!(%outcome, "Simulation ended without arrival");
    }

    let metrics = session.metrics();
    println!();
    println!("Simulation {} after {:.1}s", outcome, elapsed.as_secs_f64());
    println!("  Final phase:      {}", final_phase.description());
    println!("  Progress updates: {}", progress_updates.load(Ordering::Relaxed));
    println!();
    println!("  Metrics: {}", metrics);

    drop(session);
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}

/// Straight northbound route along the prime meridian.
///
/// The first half is motorway and the rest primary road, so congestion
/// smoothing meets an access-controlled exit halfway through.
fn synthetic_route(segments: usize) -> NavigationRoute {
    let geometry = (0..=segments)
        .map(|i| GeoPoint::new(i as f64 * SEGMENT_DEGREES, 0.0))
        .collect();
    let exit = segments / 2;
    NavigationRoute::new(
        "simulated",
        vec![RouteLeg {
            geometry,
            congestion_numeric: vec![BASE_CONGESTION; segments],
            steps: vec![
                RouteStep {
                    instruction: Some("Head north on the motorway".to_string()),
                    intersections: vec![Intersection::new(0, Some(RoadClass::Motorway))],
                },
                RouteStep {
                    instruction: Some("Take the exit".to_string()),
                    intersections: vec![Intersection::new(exit, Some(RoadClass::Primary))],
                },
            ],
            congestion_override: None,
        }],
    )
}

fn register_loggers(
    session: &TripSession,
    verbose: bool,
    arrived: Arc<AtomicBool>,
    progress_updates: Arc<AtomicU64>,
) {
    session.register_session_state_observer(Arc::new(|state: &SessionState| {
        info!(%state, "Session state");
    }));

    session.register_navigation_phase_observer(Arc::new(move |phase: &NavigationPhase| {
        info!(phase = phase.description(), "Navigation phase");
        if *phase == NavigationPhase::Arrival {
            arrived.store(true, Ordering::SeqCst);
        }
    }));

    session.register_route_progress_observer(Arc::new(move |progress: &RouteProgress| {
        progress_updates.fetch_add(1, Ordering::Relaxed);
        let worst = progress.congestion.iter().map(|c| c.band).max();
        info!(
            route = %progress.route_id,
            state = ?progress.state,
            geometry_index = progress.leg_geometry_index,
            remaining_m = progress.distance_remaining_m.round(),
            traveled_pct = (progress.fraction_traveled() * 100.0).round(),
            worst_band = ?worst,
            "Route progress"
        );
    }));

    session.register_instruction_cues_observer(Arc::new(|cues: &InstructionCues| {
        info!(
            step = cues.step_index,
            banner = cues.banner.as_deref().unwrap_or(""),
            next = cues.voice.as_deref().unwrap_or(""),
            "Instruction"
        );
    }));

    session
        .observers()
        .off_route()
        .register(Arc::new(|off_route: &bool| {
            if *off_route {
                warn!("Off route");
            } else {
                info!("On route");
            }
        }));

    session.register_location_observer(Arc::new(move |location: &EnhancedLocation| {
        if verbose {
            debug!(
                lat = location.point.latitude,
                lon = location.point.longitude,
                road = ?location.road.road_class,
                speed_mps = ?location.speed_mps,
                "Location"
            );
        }
    }));

    session
        .observers()
        .raw_location()
        .register(Arc::new(move |sample: &RawLocationSample| {
            if verbose {
                debug!(timestamp_ms = sample.timestamp_ms, "Raw sample");
            }
        }));
}
