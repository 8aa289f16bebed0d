//! Interfaces to the collaborators a trip session drives.
//!
//! The session does not compute positions or match them to roads itself.
//! It pulls raw samples from a [`PositioningSource`], feeds them to a
//! [`MapMatchingEngine`], and asks the engine for the resulting status on
//! every tick. A [`LiveTrafficSignal`] optionally supplies congestion
//! estimates for the road just ahead.
//!
//! # Design Principles
//!
//! - **Dyn-compatible**: async methods return [`BoxFuture`] so collaborators
//!   can be held as `Arc<dyn Trait>`
//! - **Push for samples, pull for status**: the positioning source pushes
//!   through a [`LocationSink`], the session pulls engine status
//!
//! # Implementations
//!
//! | Type | Role |
//! |------|------|
//! | [`SimulatedEngine`] | Snaps samples onto the active route |
//! | [`ReplayLocationSource`] | Emits recorded samples on a timer |
//! | [`ManualLocationSource`] | Emits samples when told to |
//! | [`SpeedRatioTrafficSignal`] | Estimates congestion from speed vs. limit |

mod replay;
mod simulated;
mod speed_signal;

pub use replay::{samples_along_route, ManualLocationSource, ReplayLocationSource};
pub use simulated::{SimulatedEngine, SimulatedEngineConfig};
pub use speed_signal::SpeedRatioTrafficSignal;

use std::future::Future;
use std::ops::Range;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::{EngineError, PositioningError};
use crate::model::{
    EnhancedLocation, InstructionCues, NavigationRoute, RawLocationSample, RouteLeg,
    RouteProgressState,
};

/// Boxed future type for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Item delivered from a positioning source to the session.
pub type SampleResult = Result<RawLocationSample, PositioningError>;

/// Channel end a positioning source delivers samples through.
///
/// Cloneable and usable from any thread. Sends after the session stopped
/// are dropped and reported as `false`.
#[derive(Debug, Clone)]
pub struct LocationSink {
    tx: mpsc::UnboundedSender<SampleResult>,
}

impl LocationSink {
    /// Create a sink and the receiver the session reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SampleResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver a raw sample.
    pub fn send(&self, sample: RawLocationSample) -> bool {
        self.tx.send(Ok(sample)).is_ok()
    }

    /// Report a positioning failure.
    pub fn send_error(&self, error: PositioningError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// Whether the receiving session has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Source of raw location samples (GNSS, replay, simulator).
pub trait PositioningSource: Send + Sync {
    /// Begin delivering samples to `sink`.
    fn start_updates(&self, sink: LocationSink) -> Result<(), PositioningError>;

    /// Stop delivering samples. Must be safe to call when not started.
    fn stop_updates(&self);

    /// Most recent fix the source already has, used for the tick that
    /// runs as soon as the session starts.
    fn last_known_sample(&self) -> Option<RawLocationSample> {
        None
    }
}

/// Engine progress report along the primary route.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    /// Route the report refers to.
    pub route_id: String,
    /// Current leg.
    pub leg_index: usize,
    /// Current step within the leg.
    pub step_index: usize,
    /// Current segment within the leg geometry.
    pub leg_geometry_index: usize,
    /// Meters traveled along the route.
    pub distance_traveled_m: f64,
    /// Meters remaining to the final destination.
    pub distance_remaining_m: f64,
    /// Seconds remaining to the final destination.
    pub duration_remaining_s: f64,
}

/// Engine status for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationStatus {
    /// Map-matched location.
    pub location: EnhancedLocation,
    /// Tracking state against the primary route.
    pub route_state: RouteProgressState,
    /// Progress along the primary route, when routes are set and matched.
    pub progress: Option<ProgressReport>,
    /// Instruction text for the current step, alongside `progress`.
    pub cues: Option<InstructionCues>,
}

impl NavigationStatus {
    /// Status with a location only, no route tracking.
    pub fn free_drive(location: EnhancedLocation) -> Self {
        Self {
            location,
            route_state: RouteProgressState::Initialized,
            progress: None,
            cues: None,
        }
    }

    /// Whether the engine considers the user off the primary route.
    pub fn is_off_route(&self) -> bool {
        self.route_state == RouteProgressState::OffRoute
    }
}

/// Map-matching and route-tracking engine.
pub trait MapMatchingEngine: Send + Sync {
    /// Feed a raw sample.
    fn ingest(&self, sample: &RawLocationSample) -> Result<(), EngineError>;

    /// Status after the most recent ingest.
    fn status(&self) -> BoxFuture<'_, Result<NavigationStatus, EngineError>>;

    /// Replace the routes the engine tracks against. The first is primary.
    fn set_routes(&self, routes: &[NavigationRoute]) -> Result<(), EngineError>;
}

/// Source of live congestion estimates.
pub trait LiveTrafficSignal: Send + Sync {
    /// Expected congestion (0-100) over `segments` of `leg`, if known.
    fn expected_congestion(&self, leg: &RouteLeg, segments: Range<usize>) -> Option<u8>;
}
