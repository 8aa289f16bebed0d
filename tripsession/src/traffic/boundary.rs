//! Detection of where the route leaves a limited-access road.
//!
//! Traffic on a motorway says little about traffic past its exit, so the
//! smoother never carries an estimate across that point.

use crate::model::{RoadClass, RouteLeg};

/// Geometry index of the first intersection ahead of `from_index` at which
/// the route leaves the access-controlled road it is currently on.
///
/// Returns `None` when the current road is not access-controlled, when its
/// class is unknown, or when the leg never leaves it.
pub fn access_controlled_exit(leg: &RouteLeg, from_index: usize) -> Option<usize> {
    let current = current_road_class(leg, from_index)?;
    if !current.is_access_controlled() {
        return None;
    }

    leg.intersections()
        .filter(|i| i.geometry_index > from_index)
        .find(|i| matches!(i.road_class, Some(class) if !class.is_access_controlled()))
        .map(|i| i.geometry_index)
}

/// Class of the road the route is on at `index`: the class set by the last
/// intersection at or before it.
fn current_road_class(leg: &RouteLeg, index: usize) -> Option<RoadClass> {
    leg.intersections()
        .filter(|i| i.geometry_index <= index)
        .filter_map(|i| i.road_class)
        .last()
}
