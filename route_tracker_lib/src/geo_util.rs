use geo_types::Point;

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points, in metres.
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    let d_lat = (p2.y() - p1.y()).to_radians();
    let d_lon = (p2.x() - p1.x()).to_radians();
    let lat1 = p1.y().to_radians();
    let lat2 = p2.y().to_radians();

    let a = f64::sin(d_lat / 2.).powi(2)
        + f64::cos(lat1) * f64::cos(lat2) * f64::sin(d_lon / 2.).powi(2);
    let c = 2. * f64::atan2(f64::sqrt(a), f64::sqrt(1. - a));

    EARTH_RADIUS_M * c
}

/// Heading from `previous` to `next` in degrees, 0 = north, 90 = east.
/// Plain atan2 over the coordinate deltas, no spherical correction.
/// `None` when the two points coincide, as there is no direction of travel.
pub fn heading_degrees(previous: Point, next: Point) -> Option<f64> {
    let d_lat = next.y() - previous.y();
    let d_lon = next.x() - previous.x();
    if d_lat == 0.0 && d_lon == 0.0 {
        return None;
    }
    Some(f64::atan2(d_lon, d_lat).to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_point::lat_lon;

    #[test]
    fn identical_points_are_zero_apart() {
        let p = lat_lon(43.0, -2.0);
        assert_eq!(haversine_distance(p, p), 0.0);
    }

    #[test]
    fn hundredth_of_a_degree_latitude() {
        let d = haversine_distance(lat_lon(43.0, -2.0), lat_lon(43.01, -2.0));
        assert!((d - 1112.0).abs() < 11.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = lat_lon(43.3183, -1.9812);
        let b = lat_lon(43.2630, -2.9350);
        assert!((haversine_distance(a, b) - haversine_distance(b, a)).abs() < 1e-6);
    }

    #[test]
    fn headings() {
        let origin = lat_lon(0.0, 0.0);
        let heading = |lat, lon| heading_degrees(origin, lat_lon(lat, lon)).unwrap();
        assert!((heading(1.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((heading(0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((heading(-1.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((heading(0.0, -1.0) + 90.0).abs() < 1e-9);
    }

    #[test]
    fn standing_still_has_no_heading() {
        let p = lat_lon(43.3183, -1.9812);
        assert_eq!(heading_degrees(p, p), None);
    }
}
