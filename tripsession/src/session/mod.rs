//! The trip session: lifecycle, observers and navigation inputs.
//!
//! A [`TripSession`] ties a positioning source and a map-matching engine
//! together. While started, a background worker turns each raw sample
//! into a tick:
//!
//! ```text
//! PositioningSource ──► LocationSink ──► worker ──► MapMatchingEngine
//!                                          │
//!                                          ▼
//!   raw location ► location ► off-route ► cues ► route progress ► phase
//!                        (ObserverHub, one shared dispatch order)
//! ```
//!
//! # Stopping
//!
//! [`TripSession::stop`] advances a generation counter under the dispatch
//! lock. A tick that started earlier may still finish its engine call, but
//! it checks the generation before every publish, so once `stop` returns
//! nothing from the old generation reaches an observer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tripsession::config::TripSessionConfig;
//! use tripsession::engine::{ManualLocationSource, SimulatedEngine};
//! use tripsession::model::EnhancedLocation;
//! use tripsession::session::TripSession;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = TripSession::new(
//!     TripSessionConfig::default(),
//!     Arc::new(SimulatedEngine::default()),
//!     Arc::new(ManualLocationSource::new()),
//!     None,
//!     tokio::runtime::Handle::current(),
//! );
//!
//! let _location = session.observers().location().subscribe(Arc::new(|l: &EnhancedLocation| {
//!     println!("{:?}", l.point);
//! }));
//! session.start()?;
//! # Ok(())
//! # }
//! ```

mod shared;
mod worker;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::TripSessionConfig;
use crate::engine::{LiveTrafficSignal, LocationSink, MapMatchingEngine, PositioningSource};
use crate::error::TripSessionError;
use crate::metrics::{MetricsSnapshot, SessionMetrics};
use crate::model::{
    EnhancedLocation, GeoPoint, InstructionCues, NavigationPhase, NavigationRoute,
    RawLocationSample, RouteProgress, SessionState,
};
use crate::observer::{ObserverHub, ObserverId, ObserverRef};
use crate::poller::{NavigatorPoller, PollerConfig};
use crate::traffic::TrafficCongestionSmoother;

use self::shared::SessionCore;
use self::worker::SessionWorker;

/// Handle to a running worker.
struct RunningWorker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RunningWorker {
    fn shutdown(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// A trip session.
///
/// Starts in [`SessionState::Stopped`] with phase
/// [`NavigationPhase::FreeDrive`]. All methods take `&self` and may be
/// called from any thread, including from inside an observer callback.
pub struct TripSession {
    core: Arc<SessionCore>,
    engine: Arc<dyn MapMatchingEngine>,
    positioning: Arc<dyn PositioningSource>,
    poller_config: PollerConfig,
    runtime: Handle,
    worker: Mutex<Option<RunningWorker>>,
}

impl TripSession {
    /// Create a stopped session.
    ///
    /// The worker is spawned on `runtime` when the session starts.
    pub fn new(
        config: TripSessionConfig,
        engine: Arc<dyn MapMatchingEngine>,
        positioning: Arc<dyn PositioningSource>,
        traffic: Option<Arc<dyn LiveTrafficSignal>>,
        runtime: Handle,
    ) -> Self {
        let metrics = Arc::new(SessionMetrics::new());
        let core = SessionCore::new(
            config.phase,
            TrafficCongestionSmoother::new(config.traffic),
            traffic,
            metrics,
        );
        Self {
            core: Arc::new(core),
            engine,
            positioning,
            poller_config: config.poller,
            runtime,
            worker: Mutex::new(None),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start acquiring positions and publishing ticks.
    ///
    /// Does nothing if already started. If the positioning source refuses
    /// to start, the session stays stopped and the error is returned.
    ///
    /// The worker's first tick publishes a location from the source's last
    /// known fix, or from whatever the engine already holds, without route
    /// progress.
    pub fn start(&self) -> Result<(), TripSessionError> {
        let _dispatch = self.core.hub().dispatch_lock().lock();
        {
            let mut worker = self.worker.lock();
            if worker.is_some() {
                debug!("Trip session already started");
                return Ok(());
            }

            let generation = self.core.advance_generation();
            let (sink, samples) = LocationSink::channel();
            self.positioning.start_updates(sink)?;
            let last_known = self.positioning.last_known_sample();

            let poller = NavigatorPoller::new(
                Arc::clone(&self.engine),
                &self.poller_config,
                Arc::clone(self.core.metrics()),
            );
            let task = SessionWorker::new(
                Arc::clone(&self.core),
                poller,
                self.poller_config.tick_policy,
                generation,
            );
            let cancel = CancellationToken::new();
            let handle = self.runtime.spawn(task.run(last_known, samples, cancel.clone()));
            *worker = Some(RunningWorker {
                cancel,
                task: handle,
            });
            info!(generation, "Trip session started");
        }

        self.core.metrics().session_started();
        self.core.set_session_state(SessionState::Started);
        self.core.recompute_phase();
        Ok(())
    }

    /// Stop acquiring positions.
    ///
    /// Does nothing if already stopped. When this returns, no result of a
    /// tick that began before the call will be delivered, and cached
    /// location and progress values are cleared.
    pub fn stop(&self) {
        let _dispatch = self.core.hub().dispatch_lock().lock();
        let Some(worker) = self.worker.lock().take() else {
            debug!("Trip session already stopped");
            return;
        };

        let generation = self.core.advance_generation();
        worker.shutdown();
        self.positioning.stop_updates();
        self.core.hub().clear_trip_caches();
        info!(generation, "Trip session stopped");
        self.core.set_session_state(SessionState::Stopped);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.core.session_state()
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// All observer categories, for scoped subscriptions and other
    /// categories not covered by the shortcuts below.
    pub fn observers(&self) -> &ObserverHub {
        self.core.hub()
    }

    /// Register a matched-location observer. Replays the last location.
    pub fn register_location_observer(&self, observer: ObserverRef<EnhancedLocation>) -> ObserverId {
        self.core.hub().location().register(observer)
    }

    /// Remove a matched-location observer. Returns whether it was registered.
    pub fn unregister_location_observer(&self, observer: &ObserverRef<EnhancedLocation>) -> bool {
        self.core.hub().location().unregister_observer(observer)
    }

    /// Register a route-progress observer. Replays the last progress.
    pub fn register_route_progress_observer(
        &self,
        observer: ObserverRef<RouteProgress>,
    ) -> ObserverId {
        self.core.hub().route_progress().register(observer)
    }

    /// Remove a route-progress observer.
    pub fn unregister_route_progress_observer(&self, observer: &ObserverRef<RouteProgress>) -> bool {
        self.core.hub().route_progress().unregister_observer(observer)
    }

    /// Register a session-state observer. Replays the current state.
    pub fn register_session_state_observer(&self, observer: ObserverRef<SessionState>) -> ObserverId {
        self.core.hub().session_state().register(observer)
    }

    /// Remove a session-state observer.
    pub fn unregister_session_state_observer(&self, observer: &ObserverRef<SessionState>) -> bool {
        self.core.hub().session_state().unregister_observer(observer)
    }

    /// Register a navigation-phase observer. Replays the current phase.
    pub fn register_navigation_phase_observer(
        &self,
        observer: ObserverRef<NavigationPhase>,
    ) -> ObserverId {
        self.core.hub().navigation_phase().register(observer)
    }

    /// Remove a navigation-phase observer.
    pub fn unregister_navigation_phase_observer(
        &self,
        observer: &ObserverRef<NavigationPhase>,
    ) -> bool {
        self.core.hub().navigation_phase().unregister_observer(observer)
    }

    /// Register an instruction-cue observer. Replays the last cues.
    pub fn register_instruction_cues_observer(
        &self,
        observer: ObserverRef<InstructionCues>,
    ) -> ObserverId {
        self.core.hub().instruction_cues().register(observer)
    }

    /// Remove an instruction-cue observer.
    pub fn unregister_instruction_cues_observer(
        &self,
        observer: &ObserverRef<InstructionCues>,
    ) -> bool {
        self.core.hub().instruction_cues().unregister_observer(observer)
    }

    // ========================================================================
    // Navigation inputs
    // ========================================================================

    /// Replace the active routes; the first is primary. An empty list
    /// clears them.
    ///
    /// The engine is updated first. If it rejects the routes, the session
    /// keeps the previous ones.
    pub fn set_active_routes(&self, routes: Vec<NavigationRoute>) -> Result<(), TripSessionError> {
        let _dispatch = self.core.hub().dispatch_lock().lock();
        self.engine.set_routes(&routes)?;
        self.core.set_routes(routes);
        Ok(())
    }

    /// Mark whether the user has started guidance along the routes.
    pub fn set_active_guidance_started(&self, started: bool) {
        let _dispatch = self.core.hub().dispatch_lock().lock();
        self.core.set_guidance_started(started);
    }

    /// Set or clear the destination.
    pub fn set_destination(&self, destination: Option<GeoPoint>) {
        let _dispatch = self.core.hub().dispatch_lock().lock();
        self.core.set_destination(destination);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current navigation phase.
    pub fn navigation_phase(&self) -> NavigationPhase {
        self.core.navigation_phase()
    }

    /// Last published route progress.
    pub fn route_progress(&self) -> Option<RouteProgress> {
        self.core.hub().route_progress().last()
    }

    /// Last published matched location.
    pub fn location(&self) -> Option<EnhancedLocation> {
        self.core.hub().location().last()
    }

    /// Last published banner and voice text.
    pub fn instruction_cues(&self) -> Option<InstructionCues> {
        self.core.hub().instruction_cues().last()
    }

    /// Last published raw sample.
    pub fn raw_location(&self) -> Option<RawLocationSample> {
        self.core.hub().raw_location().last()
    }

    /// Current destination.
    pub fn destination(&self) -> Option<GeoPoint> {
        self.core.destination()
    }

    /// Active routes, including any congestion rewrites.
    pub fn active_routes(&self) -> Vec<NavigationRoute> {
        self.core.routes()
    }

    /// Whether guidance has been started.
    pub fn guidance_started(&self) -> bool {
        self.core.guidance_started()
    }

    /// Session counters, including observer failures.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = self.core.metrics().snapshot();
        snapshot.observer_failures = self.core.hub().failure_count();
        snapshot
    }
}

impl Drop for TripSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            self.core.advance_generation();
            worker.shutdown();
            self.positioning.stop_updates();
        }
    }
}

impl std::fmt::Debug for TripSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripSession")
            .field("state", &self.state())
            .field("phase", &self.navigation_phase())
            .field("poller", &self.poller_config)
            .finish_non_exhaustive()
    }
}
