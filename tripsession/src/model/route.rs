//! Route description as handed to the session by the routing layer.
//!
//! Routes are computed elsewhere; the session only reads them, forwards
//! them to the engine, and rewrites their congestion annotations.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::location::GeoPoint;

/// Functional road class of a road section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Street,
    Service,
    Ferry,
}

impl RoadClass {
    /// Limited-access classes whose traffic behaves independently of the
    /// surrounding network.
    pub fn is_access_controlled(&self) -> bool {
        matches!(self, RoadClass::Motorway | RoadClass::Trunk)
    }

    /// Short name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoadClass::Motorway => "motorway",
            RoadClass::Trunk => "trunk",
            RoadClass::Primary => "primary",
            RoadClass::Secondary => "secondary",
            RoadClass::Tertiary => "tertiary",
            RoadClass::Street => "street",
            RoadClass::Service => "service",
            RoadClass::Ferry => "ferry",
        }
    }
}

impl std::fmt::Display for RoadClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An intersection along a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    /// Index into the leg geometry where the intersection sits.
    pub geometry_index: usize,
    /// Class of the road the route continues on after this intersection.
    pub road_class: Option<RoadClass>,
}

impl Intersection {
    /// Create a new intersection.
    pub fn new(geometry_index: usize, road_class: Option<RoadClass>) -> Self {
        Self {
            geometry_index,
            road_class,
        }
    }
}

/// One maneuver-to-maneuver step of a leg.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteStep {
    /// Maneuver instruction text, if any.
    #[serde(default)]
    pub instruction: Option<String>,
    /// Intersections in travel order.
    #[serde(default)]
    pub intersections: Vec<Intersection>,
}

/// Record of a congestion rewrite applied to a leg.
///
/// Keeps the original values so the rewrite can be inspected or undone,
/// and the inputs it was computed from so an identical pass is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct CongestionOverride {
    /// First rewritten segment index.
    pub start_index: usize,
    /// Number of segments in the rewritten range.
    pub length: usize,
    /// Values of the range before the rewrite.
    pub original: Vec<u8>,
    /// Expected congestion value the rewrite was computed from.
    pub expected: u8,
}

/// A leg between two waypoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteLeg {
    /// Leg polyline; segment `i` runs from `geometry[i]` to `geometry[i + 1]`.
    pub geometry: Vec<GeoPoint>,
    /// Numeric congestion (0-100) per geometry segment.
    #[serde(default)]
    pub congestion_numeric: Vec<u8>,
    /// Steps in travel order.
    #[serde(default)]
    pub steps: Vec<RouteStep>,
    /// Last congestion rewrite applied to this leg.
    #[serde(skip)]
    pub congestion_override: Option<CongestionOverride>,
}

impl RouteLeg {
    /// Number of geometry segments in the leg.
    pub fn segment_count(&self) -> usize {
        self.geometry.len().saturating_sub(1)
    }

    /// Length of the leg in meters.
    pub fn length_m(&self) -> f64 {
        self.geometry
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum()
    }

    /// All intersections of the leg in travel order.
    pub fn intersections(&self) -> impl Iterator<Item = &Intersection> {
        self.steps.iter().flat_map(|s| s.intersections.iter())
    }
}

/// A route as produced by the routing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRoute {
    /// Stable identifier of the route.
    pub id: String,
    /// Legs in travel order.
    pub legs: Vec<RouteLeg>,
}

impl NavigationRoute {
    /// Create a route from its legs.
    pub fn new(id: impl Into<String>, legs: Vec<RouteLeg>) -> Self {
        Self {
            id: id.into(),
            legs,
        }
    }

    /// Final point of the route, if it has any geometry.
    pub fn destination(&self) -> Option<GeoPoint> {
        self.legs.last().and_then(|leg| leg.geometry.last().copied())
    }

    /// Read a route from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg() -> RouteLeg {
        RouteLeg {
            geometry: vec![
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(0.001, 0.0),
                GeoPoint::new(0.002, 0.0),
            ],
            congestion_numeric: vec![10, 20],
            steps: vec![RouteStep {
                instruction: None,
                intersections: vec![
                    Intersection::new(0, Some(RoadClass::Motorway)),
                    Intersection::new(1, Some(RoadClass::Primary)),
                ],
            }],
            congestion_override: None,
        }
    }

    #[test]
    fn test_road_class_access_controlled() {
        assert!(RoadClass::Motorway.is_access_controlled());
        assert!(RoadClass::Trunk.is_access_controlled());
        assert!(!RoadClass::Primary.is_access_controlled());
        assert!(!RoadClass::Street.is_access_controlled());
    }

    #[test]
    fn test_leg_segments_and_length() {
        let leg = leg();
        assert_eq!(leg.segment_count(), 2);
        assert!((leg.length_m() - 222.4).abs() < 1.0);
        assert_eq!(leg.intersections().count(), 2);
    }

    #[test]
    fn test_route_destination() {
        let route = NavigationRoute::new("r1", vec![leg()]);
        assert_eq!(route.destination(), Some(GeoPoint::new(0.002, 0.0)));
        assert_eq!(NavigationRoute::new("empty", vec![]).destination(), None);
    }

    #[test]
    fn test_route_deserializes_from_json() {
        let json = r#"{
            "id": "abc",
            "legs": [{
                "geometry": [{"latitude": 0.0, "longitude": 0.0}, {"latitude": 0.0, "longitude": 0.01}],
                "congestion_numeric": [55],
                "steps": [{"intersections": [{"geometry_index": 0, "road_class": "motorway"}]}]
            }]
        }"#;
        let route: NavigationRoute = serde_json::from_str(json).unwrap();
        assert_eq!(route.id, "abc");
        assert_eq!(route.legs[0].congestion_numeric, vec![55]);
        assert_eq!(
            route.legs[0].steps[0].intersections[0].road_class,
            Some(RoadClass::Motorway)
        );
        assert!(route.legs[0].congestion_override.is_none());
    }

    #[test]
    fn test_load_json_reports_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{ not json").unwrap();
        assert!(matches!(
            NavigationRoute::load_json(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
