use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerError {
    Sensor(String),
    Routing(String),
    Configuration(String),
    Itinerary(String),
    UnknownStop(u32),
    /// The tracker event loop has exited.
    TrackerStopped,
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Sensor(msg) => write!(f, "location sensor error: {msg}"),
            TrackerError::Routing(msg) => write!(f, "routing service error: {msg}"),
            TrackerError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            TrackerError::Itinerary(msg) => write!(f, "itinerary error: {msg}"),
            TrackerError::UnknownStop(id) => write!(f, "no stop with id {id}"),
            TrackerError::TrackerStopped => write!(f, "tracker is not running"),
        }
    }
}

impl std::error::Error for TrackerError {}
