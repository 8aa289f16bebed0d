//! Guidance cues that accompany route progress.

use serde::{Deserialize, Serialize};

/// Banner and voice text for the step the user is on.
///
/// Published only when it changes, so a new value means a new step (or
/// a new route).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionCues {
    /// Route the cues belong to.
    pub route_id: String,
    /// Leg of the current step.
    pub leg_index: usize,
    /// Current step within the leg.
    pub step_index: usize,
    /// Text shown for the current step.
    pub banner: Option<String>,
    /// Announcement for the upcoming maneuver, if any.
    pub voice: Option<String>,
}

impl InstructionCues {
    /// Whether there is anything to show or say.
    pub fn is_empty(&self) -> bool {
        self.banner.is_none() && self.voice.is_none()
    }
}
