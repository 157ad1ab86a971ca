use std::{net::IpAddr, path::PathBuf, str::FromStr, time::Duration};

use geo_types::Point;
use route_tracker_lib::{stop::Itinerary, track_point::lat_lon};

use crate::TrackerError;

/// Runtime settings, read from a `key = value` file.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub bind_address: IpAddr,
    pub port: u16,

    pub routing_url: String,
    pub routing_timeout: Duration,

    /// Address of an NMEA 0183 TCP feed. Without one only the simulation is available.
    pub sensor_address: Option<String>,

    pub base: Point,
    pub depot: Point,
    pub simulation_interval: Duration,
    pub simulation_jitter_deg: f64,

    pub itinerary: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        let base = lat_lon(43.3183, -1.9812);
        Self {
            bind_address: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
            routing_url: "https://router.project-osrm.org".into(),
            routing_timeout: Duration::from_secs(10),
            sensor_address: None,
            base,
            depot: base,
            simulation_interval: Duration::from_millis(3000),
            simulation_jitter_deg: 0.005,
            itinerary: None,
            static_dir: None,
            log_dir: PathBuf::from("log"),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, TrackerError> {
    value
        .parse()
        .map_err(|_| TrackerError::Configuration(format!("invalid value for {key}: {value:?}")))
}

/// Parses a degree value that must be finite and lie within `-limit..=limit`.
fn parse_degrees(key: &str, value: &str, limit: f64) -> Result<f64, TrackerError> {
    let degrees: f64 = parse_value(key, value)?;
    if !degrees.is_finite() || degrees.abs() > limit {
        return Err(TrackerError::Configuration(format!("{key} out of range: {value:?}")));
    }
    Ok(degrees)
}

impl Configuration {
    pub fn parse(text: &str) -> Result<Self, TrackerError> {
        let mut config = Self::default();

        let mut base_lat = None;
        let mut base_lon = None;
        let mut depot_lat = None;
        let mut depot_lon = None;

        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(TrackerError::Configuration(format!("line {}: expected key = value", n + 1)));
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "bind_address" => config.bind_address = parse_value(key, value)?,
                "port" => config.port = parse_value(key, value)?,
                "routing_url" => config.routing_url = value.trim_end_matches('/').to_string(),
                "routing_timeout_secs" => config.routing_timeout = Duration::from_secs(parse_value(key, value)?),
                "sensor_address" => config.sensor_address = Some(value.to_string()).filter(|v| !v.is_empty()),
                "base_lat" => base_lat = Some(parse_degrees(key, value, 90.0)?),
                "base_lon" => base_lon = Some(parse_degrees(key, value, 180.0)?),
                "depot_lat" => depot_lat = Some(parse_degrees(key, value, 90.0)?),
                "depot_lon" => depot_lon = Some(parse_degrees(key, value, 180.0)?),
                "simulation_interval_ms" => config.simulation_interval = Duration::from_millis(parse_value(key, value)?),
                "simulation_jitter_deg" => config.simulation_jitter_deg = parse_degrees(key, value, 1.0)?,
                "itinerary" => config.itinerary = Some(PathBuf::from(value)),
                "static_dir" => config.static_dir = Some(PathBuf::from(value)),
                "log_dir" => config.log_dir = PathBuf::from(value),
                _ => tracing::warn!("Unknown config key: {}", key),
            }
        }

        config.base = lat_lon(
            base_lat.unwrap_or(config.base.y()),
            base_lon.unwrap_or(config.base.x()),
        );
        // The depot follows the base unless it is set explicitly
        config.depot = lat_lon(
            depot_lat.unwrap_or(config.base.y()),
            depot_lon.unwrap_or(config.base.x()),
        );

        if config.simulation_jitter_deg < 0.0 {
            return Err(TrackerError::Configuration("simulation_jitter_deg must not be negative".into()));
        }
        if config.simulation_interval.is_zero() {
            return Err(TrackerError::Configuration("simulation_interval_ms must be positive".into()));
        }

        Ok(config)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, TrackerError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| TrackerError::Configuration(format!("failed to read {path:?}: {err}")))?;
        Self::parse(&text)
    }

    /// The configured itinerary file, or the built-in demo round around the base.
    pub fn load_itinerary(&self) -> Result<Itinerary, TrackerError> {
        let Some(path) = &self.itinerary else {
            return Ok(Itinerary::demo(self.base));
        };

        let json = std::fs::read_to_string(path)
            .map_err(|err| TrackerError::Itinerary(format!("failed to read {path:?}: {err}")))?;
        Itinerary::from_json(&json).map_err(|err| TrackerError::Itinerary(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Configuration::parse("# nothing here\n\n").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.simulation_interval, Duration::from_secs(3));
        assert!(config.sensor_address.is_none());
        assert_eq!(config.depot, config.base);
    }

    #[test]
    fn overrides_and_unknown_keys() {
        let config = Configuration::parse(
            "port = 9000
             routing_url = http://localhost:5000/
             sensor_address = 10.0.0.5:10110
             base_lat = 43.0
             base_lon = -2.0
             depot_lon = -2.5
             simulation_interval_ms = 250
             colour = blue",
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.routing_url, "http://localhost:5000");
        assert_eq!(config.sensor_address.as_deref(), Some("10.0.0.5:10110"));
        assert_eq!(config.base, lat_lon(43.0, -2.0));
        assert_eq!(config.depot, lat_lon(43.0, -2.5));
        assert_eq!(config.simulation_interval, Duration::from_millis(250));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(Configuration::parse("port = eighty"), Err(TrackerError::Configuration(_))));
        assert!(matches!(Configuration::parse("just words"), Err(TrackerError::Configuration(_))));
        assert!(matches!(Configuration::parse("simulation_interval_ms = 0"), Err(TrackerError::Configuration(_))));
    }

    #[test]
    fn rejects_non_finite_and_out_of_range_degrees() {
        for line in [
            "simulation_jitter_deg = inf",
            "simulation_jitter_deg = NaN",
            "simulation_jitter_deg = -0.01",
            "base_lat = NaN",
            "base_lon = -inf",
            "base_lat = 91",
            "depot_lon = 180.5",
            "depot_lat = NaN",
        ] {
            assert!(
                matches!(Configuration::parse(line), Err(TrackerError::Configuration(_))),
                "{line} was accepted"
            );
        }

        let config = Configuration::parse("simulation_jitter_deg = 0\nbase_lat = -90\nbase_lon = 180").unwrap();
        assert_eq!(config.simulation_jitter_deg, 0.0);
        assert_eq!(config.base, lat_lon(-90.0, 180.0));
    }

    #[test]
    fn demo_itinerary_without_file() {
        let config = Configuration::default();
        assert_eq!(config.load_itinerary().unwrap().stops().len(), 5);
    }
}
