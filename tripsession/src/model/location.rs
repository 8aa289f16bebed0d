//! Position types: raw samples in, matched locations out.

use serde::{Deserialize, Serialize};

use super::route::RoadClass;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }

    /// Initial bearing towards `other` in degrees (0-360, 0 = north).
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }
}

/// A raw position fix as delivered by the positioning source.
///
/// Immutable once produced; consumed by at most one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawLocationSample {
    /// Reported position.
    pub point: GeoPoint,
    /// Speed over ground in meters per second, if known.
    pub speed_mps: Option<f64>,
    /// Course over ground in degrees, if known.
    pub bearing_deg: Option<f64>,
    /// Horizontal accuracy radius in meters, if known.
    pub accuracy_m: Option<f64>,
    /// Fix time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl RawLocationSample {
    /// Create a sample with only a position and timestamp.
    pub fn new(point: GeoPoint, timestamp_ms: u64) -> Self {
        Self {
            point,
            speed_mps: None,
            bearing_deg: None,
            accuracy_m: None,
            timestamp_ms,
        }
    }

    /// Set the speed over ground.
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    /// Set the course over ground.
    pub fn with_bearing(mut self, bearing_deg: f64) -> Self {
        self.bearing_deg = Some(bearing_deg);
        self
    }
}

/// Road attribution attached to a matched location.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoadAttribution {
    /// Road name, when the engine knows it.
    pub name: Option<String>,
    /// Functional class of the matched road.
    pub road_class: Option<RoadClass>,
    /// Posted speed limit in km/h.
    pub speed_limit_kph: Option<f64>,
}

/// A map-matched location produced by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedLocation {
    /// Position snapped to the road network.
    pub point: GeoPoint,
    /// Matched bearing in degrees.
    pub bearing_deg: f64,
    /// Speed carried over from the raw sample, in meters per second.
    pub speed_mps: Option<f64>,
    /// Road the position was matched to.
    pub road: RoadAttribution,
    /// Whether the engine considers the position off the road network.
    pub off_road: bool,
    /// Timestamp of the sample this result was derived from.
    pub timestamp_ms: u64,
}
