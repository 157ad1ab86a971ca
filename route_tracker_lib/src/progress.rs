use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    geo_util::haversine_distance,
    stop::{Stop, StopState},
    track_point::PositionSample,
    track_session::TrackingSession,
    CO2_KG_PER_KM, MINUTES_PER_STOP,
};

/// What a toggle request did to the stop list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopToggle {
    /// The current stop was marked completed.
    Completed,
    /// A completed stop was marked pending again.
    Reopened,
    /// A pending stop that is not current. Stops are completed in order.
    Ignored,
    UnknownStop,
}

impl StopToggle {
    pub fn changed(self) -> bool {
        matches!(self, StopToggle::Completed | StopToggle::Reopened)
    }
}

/// Stop completion state plus the metrics of the running trip.
///
/// The "current" stop is always derived from the list: it is the first
/// stop in itinerary order that is not completed.
#[derive(Debug, Clone, Default)]
pub struct ProgressModel {
    stops: Vec<Stop>,
    session: Option<TrackingSession>,
}

impl ProgressModel {
    pub fn new(stops: Vec<Stop>) -> Self {
        Self { stops, session: None }
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    fn current_index(&self) -> Option<usize> {
        self.stops.iter().position(|stop| !stop.completed)
    }

    pub fn current_stop(&self) -> Option<&Stop> {
        self.current_index().map(|i| &self.stops[i])
    }

    pub fn stop_state(&self, index: usize) -> Option<StopState> {
        let stop = self.stops.get(index)?;
        Some(if stop.completed {
            StopState::Completed
        } else if self.current_index() == Some(index) {
            StopState::Current
        } else {
            StopState::Pending
        })
    }

    /// Toggle a stop and report what happened.
    pub fn try_toggle_stop(&mut self, stop_id: u32) -> StopToggle {
        let Some(index) = self.stops.iter().position(|stop| stop.id == stop_id) else {
            return StopToggle::UnknownStop;
        };

        if self.stops[index].completed {
            self.stops[index].completed = false;
            return StopToggle::Reopened;
        }

        if self.current_index() != Some(index) {
            return StopToggle::Ignored;
        }

        self.stops[index].completed = true;
        StopToggle::Completed
    }

    /// Toggle a stop and return the updated list. Out of order completions are ignored.
    pub fn toggle_stop(&mut self, stop_id: u32) -> &[Stop] {
        self.try_toggle_stop(stop_id);
        &self.stops
    }

    pub fn completed_count(&self) -> usize {
        self.stops.iter().filter(|stop| stop.completed).count()
    }

    pub fn remaining_count(&self) -> usize {
        self.stops.len() - self.completed_count()
    }

    pub fn remaining_stops(&self) -> impl Iterator<Item = &Stop> {
        self.stops.iter().filter(|stop| !stop.completed)
    }

    pub fn progress_percent(&self) -> u8 {
        if self.stops.is_empty() {
            return 0;
        }

        let percent = (100.0 * self.completed_count() as f64 / self.stops.len() as f64).round();
        percent.clamp(0.0, 100.0) as u8
    }

    pub fn estimated_minutes_remaining(&self) -> u32 {
        self.remaining_count() as u32 * MINUTES_PER_STOP
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    /// Replaces any previous session with a fresh one.
    pub fn start_session(&mut self, now: DateTime<Utc>) -> &TrackingSession {
        self.session.insert(TrackingSession::start(now))
    }

    pub fn stop_session(&mut self, now: DateTime<Utc>) {
        if let Some(session) = self.session.as_mut() {
            session.stop(now);
        }
    }

    /// Adds the distance from the previous sample to the session totals.
    /// Returns the distance added in km, or `None` when no session is running.
    pub fn record_sample(&mut self, sample: &PositionSample) -> Option<f64> {
        let session = self.session.as_mut().filter(|session| session.running)?;

        let distance_km = session
            .last_position
            .map(|previous| haversine_distance(previous, sample.position) / 1000.0)
            .unwrap_or(0.0);

        session.distance_km += distance_km;
        session.co2_saved_kg += distance_km * CO2_KG_PER_KM;
        session.last_position = Some(sample.position);
        session.last_speed_kph = Some(sample.speed_kph);
        session.sample_count += 1;

        Some(distance_km)
    }
}
