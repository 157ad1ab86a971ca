use std::sync::Arc;

use geo_types::Point;
use route_tracker_lib::{
    geo_util::heading_degrees,
    route_path::{build_waypoints, RouteGeometry, RoutePath},
    stop::Stop,
    track_point::LatLon,
};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{routing::RoutingService, TrackerError};

/// The answer to one route refresh, delivered back to the tracker loop.
#[derive(Debug)]
pub struct RouteResponse {
    pub sequence: u64,
    pub waypoints: Vec<Point>,
    pub result: Result<RouteGeometry, TrackerError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehicleMarker {
    pub position: LatLon,
    /// Degrees clockwise from north. `None` until the vehicle has moved once.
    pub heading_deg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteView {
    pub sequence: u64,
    pub waypoints: Vec<LatLon>,
    pub geometry: Vec<LatLon>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Everything drawn on the map surface apart from the stop markers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub vehicle: Option<VehicleMarker>,
    pub route: Option<RouteView>,
    pub requested_sequence: u64,
}

/// Keeps the vehicle marker and the displayed path in line with the latest position and stops.
///
/// Route requests run as detached tasks. Each one carries a sequence number and
/// only a response newer than the path on display replaces it.
pub struct RouteRenderer {
    routing: Arc<dyn RoutingService>,
    depot: Point,
    responses: mpsc::Sender<RouteResponse>,

    path: Option<Arc<RoutePath>>,
    marker: Option<VehicleMarker>,
    requested_sequence: u64,
    applied_sequence: u64,
}

impl RouteRenderer {
    pub fn new(routing: Arc<dyn RoutingService>, depot: Point, responses: mpsc::Sender<RouteResponse>) -> Self {
        Self {
            routing,
            depot,
            responses,
            path: None,
            marker: None,
            requested_sequence: 0,
            applied_sequence: 0,
        }
    }

    /// Requests a new path from `origin` through the incomplete stops.
    /// Returns the sequence number of the request.
    pub fn refresh_route<'a>(&mut self, origin: Point, stops: impl IntoIterator<Item = &'a Stop>) -> u64 {
        let waypoints = build_waypoints(origin, stops, self.depot);

        self.requested_sequence += 1;
        let sequence = self.requested_sequence;

        let routing = self.routing.clone();
        let responses = self.responses.clone();
        tokio::spawn(async move {
            let result = routing.route(&waypoints).await;
            let response = RouteResponse {
                sequence,
                waypoints,
                result,
            };

            if responses.send(response).await.is_err() {
                tracing::debug!("Route {} resolved after the renderer went away", sequence);
            }
        });

        sequence
    }

    /// Puts a resolved route on the map. Failures and stale answers leave the current path alone.
    pub fn apply_route(&mut self, response: RouteResponse) -> bool {
        let geometry = match response.result {
            Ok(geometry) => geometry,
            Err(err) => {
                tracing::warn!("Route refresh {} failed, keeping previous path: {}", response.sequence, err);
                return false;
            }
        };

        if response.sequence <= self.applied_sequence {
            tracing::debug!(
                "Discarding stale route {} (showing {})",
                response.sequence,
                self.applied_sequence
            );
            return false;
        }

        self.applied_sequence = response.sequence;
        self.path = Some(Arc::new(RoutePath::new(response.waypoints, geometry)));
        true
    }

    /// Moves the marker and turns it towards the direction of travel.
    pub fn update_vehicle_marker(&mut self, position: Point, previous: Option<Point>) -> VehicleMarker {
        // Without movement the marker keeps pointing where it was
        let heading_deg = previous
            .and_then(|previous| heading_degrees(previous, position))
            .or_else(|| self.marker.and_then(|marker| marker.heading_deg));

        let marker = VehicleMarker {
            position: position.into(),
            heading_deg,
        };
        self.marker = Some(marker);
        marker
    }

    pub fn path(&self) -> Option<&Arc<RoutePath>> {
        self.path.as_ref()
    }

    pub fn requested_sequence(&self) -> u64 {
        self.requested_sequence
    }

    pub fn applied_sequence(&self) -> u64 {
        self.applied_sequence
    }

    pub fn map_view(&self) -> MapView {
        MapView {
            vehicle: self.marker,
            route: self.path.as_ref().map(|path| RouteView {
                sequence: self.applied_sequence,
                waypoints: path.waypoints.iter().map(|p| LatLon::from(*p)).collect(),
                geometry: path.geometry.points().map(LatLon::from).collect(),
                distance_m: path.distance_m,
                duration_s: path.duration_s,
            }),
            requested_sequence: self.requested_sequence,
        }
    }

    /// The displayed path as a GeoJSON feature, for map clients.
    pub fn route_feature(&self) -> Option<geojson::Feature> {
        let path = self.path.as_ref()?;

        let line = path.geometry.coords().map(|c| vec![c.x, c.y]).collect();
        let mut properties = serde_json::Map::new();
        properties.insert("sequence".into(), self.applied_sequence.into());
        properties.insert("distance_m".into(), path.distance_m.into());
        properties.insert("duration_s".into(), path.duration_s.into());

        Some(geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::LineString(line))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use geo_types::LineString;
    use route_tracker_lib::track_point::lat_lon;

    use super::*;

    /// Routes in a straight line through the waypoints, or fails on demand.
    struct StraightLineRouter {
        fail: AtomicBool,
    }

    #[async_trait::async_trait]
    impl RoutingService for StraightLineRouter {
        async fn route(&self, waypoints: &[Point]) -> Result<RouteGeometry, TrackerError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TrackerError::Routing("connection refused".into()));
            }
            Ok(RouteGeometry {
                geometry: LineString::from(waypoints.iter().map(|p| (p.x(), p.y())).collect::<Vec<_>>()),
                distance_m: 100.0,
                duration_s: 10.0,
            })
        }
    }

    fn renderer() -> (RouteRenderer, Arc<StraightLineRouter>, mpsc::Receiver<RouteResponse>) {
        let router = Arc::new(StraightLineRouter {
            fail: AtomicBool::new(false),
        });
        let (tx, rx) = mpsc::channel(8);
        let renderer = RouteRenderer::new(router.clone(), lat_lon(42.0, -1.0), tx);
        (renderer, router, rx)
    }

    fn stops() -> Vec<Stop> {
        vec![Stop::new(1, "A", 43.1, -2.1, ""), Stop::new(2, "B", 43.2, -2.2, "")]
    }

    async fn next(rx: &mut mpsc::Receiver<RouteResponse>) -> RouteResponse {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for route")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn refresh_resolves_and_applies() {
        let (mut renderer, _, mut rx) = renderer();
        let origin = lat_lon(43.0, -2.0);

        let sequence = renderer.refresh_route(origin, &stops());
        let response = next(&mut rx).await;
        assert_eq!(response.sequence, sequence);
        assert!(renderer.apply_route(response));

        let path = renderer.path().unwrap();
        assert_eq!(path.waypoints, vec![origin, lat_lon(43.1, -2.1), lat_lon(43.2, -2.2)]);
        assert_eq!(renderer.map_view().route.unwrap().geometry.len(), 3);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_path() {
        let (mut renderer, router, mut rx) = renderer();

        renderer.refresh_route(lat_lon(43.0, -2.0), &stops());
        renderer.apply_route(next(&mut rx).await);
        let before = renderer.path().unwrap().clone();

        router.fail.store(true, Ordering::SeqCst);
        renderer.refresh_route(lat_lon(43.05, -2.05), &stops());
        assert!(!renderer.apply_route(next(&mut rx).await));

        assert!(Arc::ptr_eq(renderer.path().unwrap(), &before));
        assert_eq!(renderer.applied_sequence(), 1);
        assert_eq!(renderer.requested_sequence(), 2);
    }

    #[tokio::test]
    async fn older_response_never_replaces_newer() {
        let (mut renderer, _, mut rx) = renderer();

        renderer.refresh_route(lat_lon(43.0, -2.0), &stops());
        let first = next(&mut rx).await;
        renderer.refresh_route(lat_lon(43.05, -2.05), &stops());
        let second = next(&mut rx).await;

        assert!(renderer.apply_route(second));
        let newest = renderer.path().unwrap().clone();

        assert!(!renderer.apply_route(first));
        assert!(Arc::ptr_eq(renderer.path().unwrap(), &newest));
        assert_eq!(renderer.applied_sequence(), 2);
    }

    #[tokio::test]
    async fn route_goes_to_depot_when_all_done() {
        let (mut renderer, _, mut rx) = renderer();
        let mut stops = stops();
        stops.iter_mut().for_each(|s| s.completed = true);

        renderer.refresh_route(lat_lon(43.0, -2.0), &stops);
        renderer.apply_route(next(&mut rx).await);

        assert_eq!(renderer.path().unwrap().waypoints, vec![lat_lon(43.0, -2.0), lat_lon(42.0, -1.0)]);
    }

    #[tokio::test]
    async fn marker_heading_follows_movement() {
        let (mut renderer, _, _rx) = renderer();

        let first = renderer.update_vehicle_marker(lat_lon(43.0, -2.0), None);
        assert_eq!(first.heading_deg, None);

        let east = renderer.update_vehicle_marker(lat_lon(43.0, -1.99), Some(lat_lon(43.0, -2.0)));
        assert!((east.heading_deg.unwrap() - 90.0).abs() < 1e-6);

        // Without a previous position the marker keeps its orientation
        let kept = renderer.update_vehicle_marker(lat_lon(43.1, -1.9), None);
        assert_eq!(kept.heading_deg, east.heading_deg);
        assert_eq!(kept.position, LatLon::new(43.1, -1.9));
    }

    #[tokio::test]
    async fn standing_still_keeps_heading() {
        let (mut renderer, _, _rx) = renderer();

        let north = renderer.update_vehicle_marker(lat_lon(43.01, -2.0), Some(lat_lon(43.0, -2.0)));
        assert!((north.heading_deg.unwrap() - 0.0).abs() < 1e-6);

        let west = renderer.update_vehicle_marker(lat_lon(43.01, -2.01), Some(lat_lon(43.01, -2.0)));
        assert!((west.heading_deg.unwrap() + 90.0).abs() < 1e-6);

        let parked = renderer.update_vehicle_marker(lat_lon(43.01, -2.01), Some(lat_lon(43.01, -2.01)));
        assert_eq!(parked.heading_deg, west.heading_deg);
    }

    #[tokio::test]
    async fn route_feature_is_a_linestring() {
        let (mut renderer, _, mut rx) = renderer();
        assert!(renderer.route_feature().is_none());

        renderer.refresh_route(lat_lon(43.0, -2.0), &stops());
        renderer.apply_route(next(&mut rx).await);

        let feature = renderer.route_feature().unwrap();
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["geometry"]["type"], "LineString");
        assert_eq!(json["geometry"]["coordinates"][0][0], -2.0);
        assert_eq!(json["properties"]["sequence"], 1);
    }
}
