//! Numeric congestion to severity band mapping.

use crate::error::ConfigError;
use crate::model::{CongestionSegment, SeverityBand};

/// Lower bounds of the severity bands on the 0-100 congestion scale.
///
/// `Light` always starts at 0. Each band covers the values from its lower
/// bound up to the next band's lower bound, exclusive.
///
/// ```text
///  0            40           60           80          100
///  ├── light ───┼─ moderate ─┼── heavy ───┼── severe ──┤
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CongestionThresholds {
    /// Lower bound of `Moderate`.
    pub moderate: u8,
    /// Lower bound of `Heavy`.
    pub heavy: u8,
    /// Lower bound of `Severe`.
    pub severe: u8,
}

impl Default for CongestionThresholds {
    fn default() -> Self {
        Self {
            moderate: 40,
            heavy: 60,
            severe: 80,
        }
    }
}

impl CongestionThresholds {
    /// Create thresholds from explicit lower bounds.
    pub fn new(moderate: u8, heavy: u8, severe: u8) -> Self {
        Self {
            moderate,
            heavy,
            severe,
        }
    }

    /// Check that the bounds are strictly increasing and within 1..=100.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = 0 < self.moderate && self.moderate < self.heavy && self.heavy < self.severe;
        if !ordered || self.severe > 100 {
            return Err(ConfigError::InvalidValue {
                key: "traffic.thresholds".to_string(),
                value: format!(
                    "moderate={} heavy={} severe={}",
                    self.moderate, self.heavy, self.severe
                ),
            });
        }
        Ok(())
    }

    /// Band containing a numeric congestion value.
    pub fn band_for(&self, value: u8) -> SeverityBand {
        if value >= self.severe {
            SeverityBand::Severe
        } else if value >= self.heavy {
            SeverityBand::Heavy
        } else if value >= self.moderate {
            SeverityBand::Moderate
        } else {
            SeverityBand::Light
        }
    }

    /// Smallest numeric value inside `band`.
    pub fn lower_bound(&self, band: SeverityBand) -> u8 {
        match band {
            SeverityBand::Light => 0,
            SeverityBand::Moderate => self.moderate,
            SeverityBand::Heavy => self.heavy,
            SeverityBand::Severe => self.severe,
        }
    }

    /// Annotate numeric values with their bands, starting at `first_index`.
    pub fn classify(&self, values: &[u8], first_index: usize) -> Vec<CongestionSegment> {
        values
            .iter()
            .enumerate()
            .map(|(offset, &value)| CongestionSegment {
                geometry_index: first_index + offset,
                value,
                band: self.band_for(value),
            })
            .collect()
    }
}
