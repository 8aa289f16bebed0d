//! Gradual blending of live congestion estimates into route annotations.
//!
//! A live estimate for the segments just ahead of the user is applied in
//! single-band steps so the displayed congestion never jumps, e.g. from
//! light straight to severe.
//!
//! # Windows
//!
//! ```text
//!  current index
//!       │
//!       ▼
//!  ─────┼──── near window ────┼── far window ──┼────────────
//!       │ clamp toward the    │ taper one band │ untouched
//!       │ live estimate       │ below near     │
//! ```
//!
//! When the route is on a motorway or trunk road both windows stop at the
//! point where it leaves that road.

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::model::{CongestionOverride, RouteLeg, SeverityBand};

use super::band::CongestionThresholds;
use super::boundary::access_controlled_exit;

/// Default number of segments in the near window.
pub const DEFAULT_NEAR_SEGMENTS: usize = 8;

/// Default number of segments in the far window.
pub const DEFAULT_FAR_SEGMENTS: usize = 4;

/// Smoother configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SmootherConfig {
    /// Whether live estimates are applied at all.
    pub enabled: bool,
    /// Segments, starting at the current one, clamped toward the estimate.
    pub near_segments: usize,
    /// Segments after the near window that taper off.
    pub far_segments: usize,
    /// Band boundaries.
    pub thresholds: CongestionThresholds,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            near_segments: DEFAULT_NEAR_SEGMENTS,
            far_segments: DEFAULT_FAR_SEGMENTS,
            thresholds: CongestionThresholds::default(),
        }
    }
}

impl SmootherConfig {
    /// Validate window sizes and thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.near_segments == 0 {
            return Err(ConfigError::InvalidValue {
                key: "traffic.near_segments".to_string(),
                value: "0".to_string(),
            });
        }
        self.thresholds.validate()
    }
}

/// Result of one smoothing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingOutcome {
    /// Full congestion array after the pass.
    pub congestion: Vec<u8>,
    /// Record of the rewritten range.
    pub record: CongestionOverride,
    /// Band of the first near-window segment after the pass.
    pub near_band: SeverityBand,
}

/// Applies live congestion estimates to route legs.
#[derive(Debug, Clone)]
pub struct TrafficCongestionSmoother {
    config: SmootherConfig,
}

impl TrafficCongestionSmoother {
    /// Create a smoother.
    pub fn new(config: SmootherConfig) -> Self {
        Self { config }
    }

    /// Smoother configuration.
    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    /// Band boundaries in use.
    pub fn thresholds(&self) -> &CongestionThresholds {
        &self.config.thresholds
    }

    /// Compute the smoothed congestion for `current` without modifying it.
    ///
    /// `boundary` is an exclusive upper bound on rewritten indices.
    /// `previous` is the record of the last pass on the same leg. Returns
    /// `None` when the pass would change nothing: the smoother is disabled,
    /// the inputs match the previous pass, the windows are empty, or every
    /// segment keeps its value.
    pub fn smooth(
        &self,
        current: &[u8],
        start_index: usize,
        expected: u8,
        boundary: Option<usize>,
        previous: Option<&CongestionOverride>,
    ) -> Option<SmoothingOutcome> {
        if !self.config.enabled {
            return None;
        }
        if let Some(prev) = previous {
            if prev.start_index == start_index && prev.expected == expected {
                trace!(start_index, expected, "Same estimate as last pass, skipping");
                return None;
            }
        }

        let limit = boundary.unwrap_or(usize::MAX).min(current.len());
        if start_index >= limit {
            return None;
        }
        let near_end = start_index.saturating_add(self.config.near_segments).min(limit);
        let far_end = near_end.saturating_add(self.config.far_segments).min(limit);

        let t = &self.config.thresholds;
        let expected_band = t.band_for(expected);
        let mut congestion = current.to_vec();

        for value in &mut congestion[start_index..near_end] {
            *value = self.near_value(*value, expected, expected_band);
        }

        let near_band = t.band_for(congestion[start_index]);
        let far_target = near_band.less_severe().unwrap_or(SeverityBand::Light);
        for value in &mut congestion[near_end..far_end] {
            *value = self.clamp_toward(*value, far_target);
        }

        if congestion[start_index..far_end] == current[start_index..far_end] {
            return None;
        }

        let original = (start_index..far_end)
            .map(|i| original_value(current, previous, i))
            .collect();
        debug!(
            start_index,
            near_end,
            far_end,
            expected,
            near_band = %near_band,
            "Smoothed congestion"
        );

        Some(SmoothingOutcome {
            congestion,
            record: CongestionOverride {
                start_index,
                length: far_end - start_index,
                original,
                expected,
            },
            near_band,
        })
    }

    /// Apply an estimate to a leg in place.
    ///
    /// Detects the motorway exit boundary from the leg's intersections.
    /// Returns whether the leg changed.
    pub fn apply_to_leg(&self, leg: &mut RouteLeg, start_index: usize, expected: u8) -> bool {
        let boundary = access_controlled_exit(leg, start_index);
        match self.smooth(
            &leg.congestion_numeric,
            start_index,
            expected,
            boundary,
            leg.congestion_override.as_ref(),
        ) {
            Some(outcome) => {
                leg.congestion_numeric = outcome.congestion;
                leg.congestion_override = Some(outcome.record);
                true
            }
            None => false,
        }
    }

    fn near_value(&self, value: u8, expected: u8, expected_band: SeverityBand) -> u8 {
        let band = self.config.thresholds.band_for(value);
        if band == expected_band {
            expected
        } else {
            self.clamp_toward(value, expected_band)
        }
    }

    /// Move `value` at most one band toward `target`, never downward.
    fn clamp_toward(&self, value: u8, target: SeverityBand) -> u8 {
        let t = &self.config.thresholds;
        let band = t.band_for(value);
        if target <= band {
            return value;
        }
        band.more_severe()
            .map(|next| t.lower_bound(next))
            .unwrap_or(value)
    }
}

impl Default for TrafficCongestionSmoother {
    fn default() -> Self {
        Self::new(SmootherConfig::default())
    }
}

/// Value reported by the route for index `i`, before any rewrite.
fn original_value(current: &[u8], previous: Option<&CongestionOverride>, i: usize) -> u8 {
    previous
        .and_then(|p| {
            i.checked_sub(p.start_index)
                .filter(|offset| *offset < p.length)
                .and_then(|offset| p.original.get(offset).copied())
        })
        .unwrap_or(current[i])
}
