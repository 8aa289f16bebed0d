//! The set of observer categories owned by one trip session.

use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::model::{
    EnhancedLocation, InstructionCues, NavigationPhase, RawLocationSample, RouteProgress,
    SessionState,
};

use super::registry::{DispatchLock, ObserverRegistry};

/// Observer categories exposed by a trip session.
///
/// All registries share one dispatch lock, so deliveries across categories
/// are serialized and follow publish order.
pub struct ObserverHub {
    dispatch: DispatchLock,
    raw_location: Arc<ObserverRegistry<RawLocationSample>>,
    location: Arc<ObserverRegistry<EnhancedLocation>>,
    route_progress: Arc<ObserverRegistry<RouteProgress>>,
    session_state: Arc<ObserverRegistry<SessionState>>,
    navigation_phase: Arc<ObserverRegistry<NavigationPhase>>,
    off_route: Arc<ObserverRegistry<bool>>,
    instruction_cues: Arc<ObserverRegistry<InstructionCues>>,
}

impl ObserverHub {
    /// Create a hub with empty registries.
    pub fn new() -> Self {
        let dispatch: DispatchLock = Arc::new(ReentrantMutex::new(()));
        Self {
            raw_location: shared_registry("raw_location", &dispatch),
            location: shared_registry("location", &dispatch),
            route_progress: shared_registry("route_progress", &dispatch),
            session_state: shared_registry("session_state", &dispatch),
            navigation_phase: shared_registry("navigation_phase", &dispatch),
            off_route: shared_registry("off_route", &dispatch),
            instruction_cues: shared_registry("instruction_cues", &dispatch),
            dispatch,
        }
    }

    /// Raw samples accepted from the positioning source.
    pub fn raw_location(&self) -> &Arc<ObserverRegistry<RawLocationSample>> {
        &self.raw_location
    }

    /// Map-matched locations.
    pub fn location(&self) -> &Arc<ObserverRegistry<EnhancedLocation>> {
        &self.location
    }

    /// Progress along the primary route.
    pub fn route_progress(&self) -> &Arc<ObserverRegistry<RouteProgress>> {
        &self.route_progress
    }

    /// Session lifecycle state.
    pub fn session_state(&self) -> &Arc<ObserverRegistry<SessionState>> {
        &self.session_state
    }

    /// Derived navigation phase.
    pub fn navigation_phase(&self) -> &Arc<ObserverRegistry<NavigationPhase>> {
        &self.navigation_phase
    }

    /// Off-route flag, published on change.
    pub fn off_route(&self) -> &Arc<ObserverRegistry<bool>> {
        &self.off_route
    }

    /// Banner and voice cues, published when the step changes.
    pub fn instruction_cues(&self) -> &Arc<ObserverRegistry<InstructionCues>> {
        &self.instruction_cues
    }

    /// Observer callbacks that panicked, across all categories.
    pub fn failure_count(&self) -> u64 {
        self.raw_location.failure_count()
            + self.location.failure_count()
            + self.route_progress.failure_count()
            + self.session_state.failure_count()
            + self.navigation_phase.failure_count()
            + self.off_route.failure_count()
            + self.instruction_cues.failure_count()
    }

    pub(crate) fn dispatch_lock(&self) -> &DispatchLock {
        &self.dispatch
    }

    /// Drop cached trip values so observers registered later get no stale replay.
    ///
    /// Observers last told the user was off route are first told otherwise.
    pub(crate) fn clear_trip_caches(&self) {
        let _dispatch = self.dispatch.lock();
        if self.off_route.last() == Some(true) {
            self.off_route.publish(false);
        }
        self.raw_location.clear_last();
        self.location.clear_last();
        self.route_progress.clear_last();
        self.off_route.clear_last();
        self.instruction_cues.clear_last();
    }
}

fn shared_registry<T>(name: &'static str, dispatch: &DispatchLock) -> Arc<ObserverRegistry<T>>
where
    T: Clone + Send + Sync + 'static,
{
    Arc::new(ObserverRegistry::with_dispatch(name, Arc::clone(dispatch)))
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub")
            .field("raw_location", &self.raw_location)
            .field("location", &self.location)
            .field("route_progress", &self.route_progress)
            .field("session_state", &self.session_state)
            .field("navigation_phase", &self.navigation_phase)
            .field("off_route", &self.off_route)
            .field("instruction_cues", &self.instruction_cues)
            .finish()
    }
}
