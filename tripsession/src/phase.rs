//! Navigation phase derivation.
//!
//! The phase is a pure function of four session facts plus one latch:
//!
//! ```text
//! no destination                      -> FreeDrive
//! destination, no routes              -> FreeDrive (or DestinationPreview)
//! routes, guidance not started        -> RoutePreview
//! routes, guidance started            -> ActiveGuidance
//! routes, guidance started, arrived   -> Arrival
//! ```
//!
//! Once `Arrival` is reached it is held until the destination or the
//! routes are cleared, even if the final location report is lost or
//! guidance is stopped in the meantime.

use tracing::{debug, warn};

use crate::model::NavigationPhase;

/// Session facts the phase is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseInputs {
    /// A destination is set.
    pub has_destination: bool,
    /// At least one route is active.
    pub has_routes: bool,
    /// The user has started guidance.
    pub guidance_started: bool,
    /// The engine reports the final destination reached.
    pub arrived: bool,
}

impl PhaseInputs {
    /// Whether `arrived` contradicts the other facts.
    pub fn is_contradictory(&self) -> bool {
        self.arrived && !(self.has_routes && self.guidance_started)
    }
}

/// Phase derivation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseConfig {
    /// Report `DestinationPreview` instead of `FreeDrive` while a
    /// destination is set but no route is available yet.
    pub preview_destination_without_routes: bool,
}

/// Derive the phase from the inputs, ignoring the arrival latch.
///
/// Contradictory inputs are resolved by treating `arrived` as false.
pub fn derive_phase(inputs: PhaseInputs, config: &PhaseConfig) -> NavigationPhase {
    if !inputs.has_destination {
        return NavigationPhase::FreeDrive;
    }
    if !inputs.has_routes {
        return if config.preview_destination_without_routes {
            NavigationPhase::DestinationPreview
        } else {
            NavigationPhase::FreeDrive
        };
    }
    if !inputs.guidance_started {
        return NavigationPhase::RoutePreview;
    }
    if inputs.arrived {
        NavigationPhase::Arrival
    } else {
        NavigationPhase::ActiveGuidance
    }
}

/// Outcome of feeding new inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseUpdate {
    /// Phase after the update.
    pub phase: NavigationPhase,
    /// Whether the phase differs from the one before the update.
    pub changed: bool,
    /// Whether the inputs were contradictory.
    pub invalid: bool,
}

/// Tracks the current navigation phase and the arrival latch.
#[derive(Debug, Default)]
pub struct NavigationPhaseStateMachine {
    config: PhaseConfig,
    current: NavigationPhase,
    arrived_latch: bool,
    invalid_transitions: u64,
}

impl NavigationPhaseStateMachine {
    /// Create a state machine in `FreeDrive`.
    pub fn new(config: PhaseConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Current phase.
    pub fn current(&self) -> NavigationPhase {
        self.current
    }

    /// Number of contradictory input sets seen.
    pub fn invalid_transitions(&self) -> u64 {
        self.invalid_transitions
    }

    /// Recompute the phase from fresh inputs.
    pub fn update(&mut self, inputs: PhaseInputs) -> PhaseUpdate {
        let invalid = inputs.is_contradictory();
        let mut effective = inputs;
        if invalid {
            self.invalid_transitions += 1;
            warn!(
                has_routes = inputs.has_routes,
                guidance_started = inputs.guidance_started,
                "Arrival reported without active guidance, ignoring"
            );
            effective.arrived = false;
        }

        let mut phase = derive_phase(effective, &self.config);
        if !effective.has_destination || !effective.has_routes {
            self.arrived_latch = false;
        } else if phase == NavigationPhase::Arrival {
            self.arrived_latch = true;
        } else if self.arrived_latch {
            phase = NavigationPhase::Arrival;
        }

        let changed = phase != self.current;
        if changed {
            debug!(from = %self.current, to = %phase, "Navigation phase changed");
            self.current = phase;
        }
        PhaseUpdate {
            phase,
            changed,
            invalid,
        }
    }

    /// Return to `FreeDrive` and clear the latch.
    pub fn reset(&mut self) {
        self.current = NavigationPhase::FreeDrive;
        self.arrived_latch = false;
    }
}
