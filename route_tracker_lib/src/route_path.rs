use geo_types::{LineString, Point};
use serde::{Deserialize, Serialize};

use crate::stop::Stop;

/// The path geometry a routing service resolved for a waypoint list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    pub geometry: LineString,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// A rendered route: the waypoints that were requested and the path that came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePath {
    pub waypoints: Vec<Point>,
    pub geometry: LineString,
    pub distance_m: f64,
    pub duration_s: f64,
}

impl RoutePath {
    pub fn new(waypoints: Vec<Point>, resolved: RouteGeometry) -> Self {
        Self {
            waypoints,
            geometry: resolved.geometry,
            distance_m: resolved.distance_m,
            duration_s: resolved.duration_s,
        }
    }
}

/// Origin followed by every incomplete stop in itinerary order,
/// or origin and depot once nothing remains.
pub fn build_waypoints<'a>(origin: Point, stops: impl IntoIterator<Item = &'a Stop>, depot: Point) -> Vec<Point> {
    let mut waypoints = vec![origin];
    waypoints.extend(stops.into_iter().filter(|stop| !stop.completed).map(Stop::point));

    if waypoints.len() == 1 {
        waypoints.push(depot);
    }

    waypoints
}
