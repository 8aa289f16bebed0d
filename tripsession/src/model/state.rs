//! Session lifecycle and navigation phase enums.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a trip session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No position acquisition and no poll loop.
    #[default]
    Stopped,
    /// Position acquisition running, poll loop active.
    Started,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Started => write!(f, "started"),
        }
    }
}

/// Navigation phase derived from destination, routes, guidance and arrival.
///
/// Never set directly; see [`NavigationPhaseStateMachine`](crate::phase::NavigationPhaseStateMachine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationPhase {
    /// Driving without a route.
    #[default]
    FreeDrive,
    /// A destination is chosen but no route has been requested yet.
    DestinationPreview,
    /// Routes are available and awaiting the start of guidance.
    RoutePreview,
    /// Turn-by-turn guidance along the primary route.
    ActiveGuidance,
    /// The final destination has been reached.
    Arrival,
}

impl NavigationPhase {
    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            NavigationPhase::FreeDrive => "free drive",
            NavigationPhase::DestinationPreview => "destination preview",
            NavigationPhase::RoutePreview => "route preview",
            NavigationPhase::ActiveGuidance => "active guidance",
            NavigationPhase::Arrival => "arrival",
        }
    }
}

impl std::fmt::Display for NavigationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigationPhase::FreeDrive => write!(f, "free_drive"),
            NavigationPhase::DestinationPreview => write!(f, "destination_preview"),
            NavigationPhase::RoutePreview => write!(f, "route_preview"),
            NavigationPhase::ActiveGuidance => write!(f, "active_guidance"),
            NavigationPhase::Arrival => write!(f, "arrival"),
        }
    }
}
