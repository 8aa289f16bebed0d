//! Congestion severity classification.

use serde::{Deserialize, Serialize};

/// Discrete congestion severity, ordered from least to most severe.
///
/// The numeric range each band covers is supplied by
/// [`CongestionThresholds`](crate::traffic::CongestionThresholds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityBand {
    Light,
    Moderate,
    Heavy,
    Severe,
}

impl SeverityBand {
    /// All bands in ascending severity.
    pub const ALL: [SeverityBand; 4] = [
        SeverityBand::Light,
        SeverityBand::Moderate,
        SeverityBand::Heavy,
        SeverityBand::Severe,
    ];

    /// Ordering weight (0 = least severe).
    pub fn weight(&self) -> u8 {
        match self {
            SeverityBand::Light => 0,
            SeverityBand::Moderate => 1,
            SeverityBand::Heavy => 2,
            SeverityBand::Severe => 3,
        }
    }

    /// Band with the given weight, if one exists.
    pub fn from_weight(weight: u8) -> Option<SeverityBand> {
        Self::ALL.get(weight as usize).copied()
    }

    /// The next more severe band, if any.
    pub fn more_severe(&self) -> Option<SeverityBand> {
        Self::from_weight(self.weight() + 1)
    }

    /// The next less severe band, if any.
    pub fn less_severe(&self) -> Option<SeverityBand> {
        self.weight().checked_sub(1).and_then(Self::from_weight)
    }
}

impl std::fmt::Display for SeverityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeverityBand::Light => write!(f, "light"),
            SeverityBand::Moderate => write!(f, "moderate"),
            SeverityBand::Heavy => write!(f, "heavy"),
            SeverityBand::Severe => write!(f, "severe"),
        }
    }
}

/// Congestion annotation of a single route segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CongestionSegment {
    /// Leg geometry index of the segment start.
    pub geometry_index: usize,
    /// Numeric severity, 0-100.
    pub value: u8,
    /// Band derived from `value`.
    pub band: SeverityBand,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_ordering_matches_weight() {
        for pair in SeverityBand::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].weight() + 1, pair[1].weight());
        }
    }

    #[test]
    fn test_band_neighbours() {
        assert_eq!(SeverityBand::Light.more_severe(), Some(SeverityBand::Moderate));
        assert_eq!(SeverityBand::Severe.more_severe(), None);
        assert_eq!(SeverityBand::Light.less_severe(), None);
        assert_eq!(SeverityBand::Heavy.less_severe(), Some(SeverityBand::Moderate));
    }

    #[test]
    fn test_band_display() {
        assert_eq!(SeverityBand::Moderate.to_string(), "moderate");
    }
}
