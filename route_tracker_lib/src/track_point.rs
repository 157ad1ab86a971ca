use chrono::{DateTime, Utc};
use geo_types::Point;
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair as it is shown to map clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn to_point(self) -> Point {
        Point::new(self.lon, self.lat)
    }
}

impl From<Point> for LatLon {
    fn from(point: Point) -> Self {
        Self {
            lat: point.y(),
            lon: point.x(),
        }
    }
}

/// Build a point from latitude and longitude, in that order.
/// geo_types stores x = longitude, y = latitude.
pub fn lat_lon(lat: f64, lon: f64) -> Point {
    Point::new(lon, lat)
}

/// One position reading from the vehicle, live or simulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub position: Point,
    pub speed_kph: f64,
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(position: Point, speed_kph: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            position,
            speed_kph,
            timestamp,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.position.y()
    }

    pub fn longitude(&self) -> f64 {
        self.position.x()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lat_lon_maps_to_point_axes() {
        let point = lat_lon(43.0, -2.0);
        assert_eq!(point.x(), -2.0);
        assert_eq!(point.y(), 43.0);

        let view = LatLon::from(point);
        assert_eq!(view, LatLon::new(43.0, -2.0));
        assert_eq!(view.to_point(), point);
    }
}
