use chrono::{DateTime, Utc};
use geo_types::Point;
use serde::{Deserialize, Serialize};

/// Metrics accumulated between starting and stopping tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSession {
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub distance_km: f64,
    pub co2_saved_kg: f64,
    pub last_position: Option<Point>,
    pub last_speed_kph: Option<f64>,
    pub sample_count: u64,
}

impl TrackingSession {
    pub fn start(started_at: DateTime<Utc>) -> Self {
        Self {
            running: true,
            started_at,
            ended_at: None,
            distance_km: 0.0,
            co2_saved_kg: 0.0,
            last_position: None,
            last_speed_kph: None,
            sample_count: 0,
        }
    }

    /// Freezes the session. Stopping twice keeps the first end time.
    pub fn stop(&mut self, ended_at: DateTime<Utc>) {
        if self.running {
            self.running = false;
            self.ended_at = Some(ended_at);
        }
    }

    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.ended_at.unwrap_or(now).signed_duration_since(self.started_at)
    }
}
