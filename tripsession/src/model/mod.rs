//! Data model shared by every part of the session.
//!
//! ```text
//! RawLocationSample ──► engine ──► EnhancedLocation
//!                                  RouteProgress ──► CongestionSegment[]
//!                                  InstructionCues
//! NavigationRoute ──► RouteLeg ──► RouteStep ──► Intersection
//! ```

mod congestion;
mod cues;
mod location;
mod progress;
mod route;
mod state;

pub use congestion::{CongestionSegment, SeverityBand};
pub use cues::InstructionCues;
pub use location::{EnhancedLocation, GeoPoint, RawLocationSample, RoadAttribution};
pub use progress::{RouteProgress, RouteProgressState};
pub use route::{
    CongestionOverride, Intersection, NavigationRoute, RoadClass, RouteLeg, RouteStep,
};
pub use state::{NavigationPhase, SessionState};
