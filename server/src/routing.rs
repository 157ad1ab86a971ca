use std::time::Duration;

use geo_types::{LineString, Point};
use route_tracker_lib::route_path::RouteGeometry;
use serde::Deserialize;

use crate::TrackerError;

/// An external service that resolves a drivable path through waypoints.
#[async_trait::async_trait]
pub trait RoutingService: Send + Sync {
    async fn route(&self, waypoints: &[Point]) -> Result<RouteGeometry, TrackerError>;
}

/// Client for an OSRM compatible `route/v1/driving` endpoint.
#[derive(Clone)]
pub struct OsrmClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: geojson::Geometry,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

impl OsrmClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TrackerError::Routing(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn route_url(&self, waypoints: &[Point]) -> String {
        let coordinates = waypoints
            .iter()
            .map(|p| format!("{:.6},{:.6}", p.x(), p.y()))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/route/v1/driving/{}?overview=full&geometries=geojson",
            self.base_url, coordinates
        )
    }
}

#[async_trait::async_trait]
impl RoutingService for OsrmClient {
    async fn route(&self, waypoints: &[Point]) -> Result<RouteGeometry, TrackerError> {
        if waypoints.len() < 2 {
            return Err(TrackerError::Routing("at least two waypoints are required".into()));
        }

        let url = self.route_url(waypoints);
        tracing::debug!("Requesting route: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| TrackerError::Routing(format!("request failed: {err}")))?;

        let status = response.status();
        let body: OsrmResponse = response
            .json()
            .await
            .map_err(|err| TrackerError::Routing(format!("malformed response ({status}): {err}")))?;

        parse_route(body)
    }
}

fn parse_route(body: OsrmResponse) -> Result<RouteGeometry, TrackerError> {
    if body.code != "Ok" {
        return Err(TrackerError::Routing(format!(
            "service answered {}: {}",
            body.code,
            body.message.unwrap_or_default()
        )));
    }

    let Some(route) = body.routes.into_iter().next() else {
        return Err(TrackerError::Routing("no route returned".into()));
    };

    let geojson::Value::LineString(positions) = route.geometry.value else {
        return Err(TrackerError::Routing("route geometry is not a LineString".into()));
    };

    let mut coords = Vec::with_capacity(positions.len());
    for position in positions {
        let [lon, lat, ..] = position.as_slice() else {
            return Err(TrackerError::Routing("route geometry has a short position".into()));
        };
        coords.push((*lon, *lat));
    }

    Ok(RouteGeometry {
        geometry: LineString::from(coords),
        distance_m: route.distance,
        duration_s: route.duration,
    })
}
