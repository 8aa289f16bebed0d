//! Route progress as published to observers.

use serde::{Deserialize, Serialize};

use super::congestion::CongestionSegment;

/// Tracking state of the current route as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteProgressState {
    /// Route set, no position matched to it yet.
    #[default]
    Initialized,
    /// Position confidently matched to the route.
    Tracking,
    /// Matching is ambiguous.
    Uncertain,
    /// Position has left the route.
    OffRoute,
    /// The final destination has been reached.
    Complete,
}

/// Progress along the primary route for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteProgress {
    /// Identifier of the route this progress refers to.
    pub route_id: String,
    /// Tracking state.
    pub state: RouteProgressState,
    /// Index of the current leg.
    pub leg_index: usize,
    /// Index of the current step within the leg.
    pub step_index: usize,
    /// Index of the current segment within the leg geometry.
    pub leg_geometry_index: usize,
    /// Distance traveled along the route in meters.
    pub distance_traveled_m: f64,
    /// Distance remaining to the final destination in meters.
    pub distance_remaining_m: f64,
    /// Estimated time remaining in seconds.
    pub duration_remaining_s: f64,
    /// Congestion of the current leg from the current segment onwards.
    pub congestion: Vec<CongestionSegment>,
}

impl RouteProgress {
    /// Whether the trip is complete.
    pub fn is_complete(&self) -> bool {
        self.state == RouteProgressState::Complete
    }

    /// Fraction of the route traveled (0.0 to 1.0).
    pub fn fraction_traveled(&self) -> f64 {
        let total = self.distance_traveled_m + self.distance_remaining_m;
        if total <= 0.0 {
            return 0.0;
        }
        (self.distance_traveled_m / total).clamp(0.0, 1.0)
    }
}
