//! Congestion estimate from the user's own speed.

use std::ops::Range;

use parking_lot::Mutex;

use crate::model::{EnhancedLocation, RouteLeg};
use crate::observer::Observer;

use super::LiveTrafficSignal;

/// Below this speed (m/s) the user may simply be stopped at a light.
const MIN_MOVING_SPEED_MPS: f64 = 1.0;

/// Estimates congestion as the shortfall of the current speed against the
/// posted limit: driving at the limit is 0, standing still is 100.
///
/// Register it as a location observer so it sees every matched location.
#[derive(Debug, Default)]
pub struct SpeedRatioTrafficSignal {
    latest: Mutex<Option<(f64, f64)>>,
}

impl SpeedRatioTrafficSignal {
    /// Create a signal with no observation yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate for a speed and limit, both in km/h.
    pub fn estimate(speed_kph: f64, limit_kph: f64) -> Option<u8> {
        if limit_kph <= 0.0 || !speed_kph.is_finite() {
            return None;
        }
        let shortfall = (1.0 - speed_kph / limit_kph).clamp(0.0, 1.0);
        Some((shortfall * 100.0).round() as u8)
    }
}

impl Observer<EnhancedLocation> for SpeedRatioTrafficSignal {
    fn on_event(&self, location: &EnhancedLocation) {
        let observation = match (location.speed_mps, location.road.speed_limit_kph) {
            (Some(speed), Some(limit)) if speed >= MIN_MOVING_SPEED_MPS && !location.off_road => {
                Some((speed * 3.6, limit))
            }
            _ => None,
        };
        *self.latest.lock() = observation;
    }
}

impl LiveTrafficSignal for SpeedRatioTrafficSignal {
    fn expected_congestion(&self, _leg: &RouteLeg, segments: Range<usize>) -> Option<u8> {
        if segments.is_empty() {
            return None;
        }
        let (speed_kph, limit_kph) = (*self.latest.lock())?;
        Self::estimate(speed_kph, limit_kph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GeoPoint, RoadAttribution};

    fn location(speed_mps: Option<f64>, limit_kph: Option<f64>) -> EnhancedLocation {
        EnhancedLocation {
            point: GeoPoint::new(0.0, 0.0),
            bearing_deg: 0.0,
            speed_mps,
            road: RoadAttribution {
                name: None,
                road_class: None,
                speed_limit_kph: limit_kph,
            },
            off_road: false,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_estimate_scale() {
        assert_eq!(SpeedRatioTrafficSignal::estimate(100.0, 100.0), Some(0));
        assert_eq!(SpeedRatioTrafficSignal::estimate(130.0, 100.0), Some(0));
        assert_eq!(SpeedRatioTrafficSignal::estimate(30.0, 100.0), Some(70));
        assert_eq!(SpeedRatioTrafficSignal::estimate(0.0, 100.0), Some(100));
        assert_eq!(SpeedRatioTrafficSignal::estimate(50.0, 0.0), None);
    }

    #[test]
    fn test_uses_latest_observed_location() {
        let signal = SpeedRatioTrafficSignal::new();
        let leg = RouteLeg::default();
        assert_eq!(signal.expected_congestion(&leg, 0..4), None);

        // 8.33 m/s = 30 km/h against 100 km/h.
        signal.on_event(&location(Some(30.0 / 3.6), Some(100.0)));
        assert_eq!(signal.expected_congestion(&leg, 0..4), Some(70));

        signal.on_event(&location(None, Some(100.0)));
        assert_eq!(signal.expected_congestion(&leg, 0..4), None);
    }

    #[test]
    fn test_stationary_user_gives_no_estimate() {
        let signal = SpeedRatioTrafficSignal::new();
        signal.on_event(&location(Some(0.2), Some(50.0)));
        assert_eq!(signal.expected_congestion(&RouteLeg::default(), 0..4), None);
    }
}
