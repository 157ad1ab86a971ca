use std::collections::HashSet;

use geo_types::Point;
use serde::{Deserialize, Serialize};

use crate::track_point::{lat_lon, LatLon};

/// A fixed waypoint on the itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: u32,
    pub name: String,
    pub position: LatLon,
    pub completed: bool,
    pub estimated_time: String,
}

impl Stop {
    pub fn new(id: u32, name: impl Into<String>, lat: f64, lon: f64, estimated_time: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: LatLon::new(lat, lon),
            completed: false,
            estimated_time: estimated_time.into(),
        }
    }

    pub fn point(&self) -> Point {
        self.position.to_point()
    }
}

/// Display state of a stop. `Current` is never stored, only derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopState {
    Pending,
    Current,
    Completed,
}

#[derive(Deserialize)]
struct ItineraryEntry {
    id: u32,
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    estimated_time: String,
}

#[derive(Debug)]
pub enum ItineraryError {
    Parse(serde_json::Error),
    DuplicateStop(u32),
}

impl std::fmt::Display for ItineraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItineraryError::Parse(err) => write!(f, "invalid itinerary: {err}"),
            ItineraryError::DuplicateStop(id) => write!(f, "stop id {id} appears more than once"),
        }
    }
}

impl std::error::Error for ItineraryError {}

/// The ordered list of stops a session starts from.
#[derive(Debug, Clone, PartialEq)]
pub struct Itinerary {
    stops: Vec<Stop>,
}

impl Itinerary {
    /// Parses a JSON array of `{ id, name, lat, lon, estimated_time }`.
    pub fn from_json(json: &str) -> Result<Self, ItineraryError> {
        let entries: Vec<ItineraryEntry> = serde_json::from_str(json).map_err(ItineraryError::Parse)?;

        let mut seen = HashSet::new();
        let mut stops = Vec::with_capacity(entries.len());
        for entry in entries {
            if !seen.insert(entry.id) {
                return Err(ItineraryError::DuplicateStop(entry.id));
            }
            stops.push(Stop::new(entry.id, entry.name, entry.lat, entry.lon, entry.estimated_time));
        }

        Ok(Self { stops })
    }

    /// Built-in delivery round used when no itinerary file is configured.
    pub fn demo(base: Point) -> Self {
        let offsets = [
            ("Warehouse North", 0.0080, 0.0040, "08:30"),
            ("Central Market", 0.0030, 0.0120, "08:50"),
            ("Harbour Office", -0.0050, 0.0090, "09:15"),
            ("University Campus", -0.0110, -0.0020, "09:40"),
            ("Hospital Gate", -0.0040, -0.0130, "10:05"),
        ];

        let stops = offsets
            .iter()
            .enumerate()
            .map(|(i, (name, d_lat, d_lon, eta))| {
                let position = lat_lon(base.y() + d_lat, base.x() + d_lon);
                Stop::new(i as u32 + 1, *name, position.y(), position.x(), *eta)
            })
            .collect();

        Self { stops }
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn into_stops(self) -> Vec<Stop> {
        self.stops
    }
}
