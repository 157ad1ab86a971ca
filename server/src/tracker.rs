use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo_types::Point;
use route_tracker_lib::{
    progress::{ProgressModel, StopToggle},
    stop::{Stop, StopState},
    track_point::{LatLon, PositionSample},
};
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    position::{FeedMode, LocationSensor, PositionEvent, PositionEventKind, PositionSource, Simulator, SourceStatus},
    renderer::{MapView, RouteRenderer, RouteResponse},
    routing::RoutingService,
    TrackerError,
};

const CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopView {
    pub id: u32,
    pub name: String,
    pub position: LatLon,
    pub estimated_time: String,
    pub completed: bool,
    pub state: StopState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub distance_km: f64,
    pub co2_saved_kg: f64,
    pub last_position: Option<LatLon>,
    pub last_speed_kph: Option<f64>,
    pub samples: u64,
}

/// What the dashboard shows: source status, trip metrics, stop progress and the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerSnapshot {
    pub status: SourceStatus,
    pub status_text: String,
    pub session: Option<SessionView>,
    pub stops: Vec<StopView>,
    pub current_stop: Option<u32>,
    pub progress_percent: u8,
    pub remaining_stops: usize,
    pub estimated_minutes_remaining: u32,
    pub map: MapView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToggleResult {
    pub outcome: StopToggle,
    pub stops: Vec<StopView>,
}

enum TrackerCommand {
    StartTracking(FeedMode, oneshot::Sender<TrackerSnapshot>),
    StopTracking(oneshot::Sender<TrackerSnapshot>),
    ToggleStop(u32, oneshot::Sender<Result<ToggleResult, TrackerError>>),
    Snapshot(oneshot::Sender<TrackerSnapshot>),
    RouteFeature(oneshot::Sender<Option<geojson::Feature>>),
}

/// The collaborators a tracker is built from.
pub struct TrackerParts {
    pub stops: Vec<Stop>,
    pub sensor: Option<Arc<dyn LocationSensor>>,
    pub simulator: Simulator,
    pub routing: Arc<dyn RoutingService>,
    pub depot: Point,
}

/// Owns the progress model, the position source and the route renderer.
/// All of them are only touched from the tracker's own task.
struct Tracker {
    progress: ProgressModel,
    source: PositionSource,
    renderer: RouteRenderer,
    /// Route origin before the first sample arrives.
    fallback_origin: Point,
}

/// Starts the tracker loop and returns a handle to it.
pub fn spawn(parts: TrackerParts) -> (TrackerHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(CHANNEL_SIZE);
    let (position_tx, position_rx) = mpsc::channel(CHANNEL_SIZE);
    let (route_tx, route_rx) = mpsc::channel(CHANNEL_SIZE);

    let fallback_origin = parts.simulator.base;
    let tracker = Tracker {
        progress: ProgressModel::new(parts.stops),
        source: PositionSource::new(parts.sensor, parts.simulator, position_tx),
        renderer: RouteRenderer::new(parts.routing, parts.depot, route_tx),
        fallback_origin,
    };

    let task = tokio::spawn(tracker.run(command_rx, position_rx, route_rx));
    (TrackerHandle { tx: command_tx }, task)
}

impl Tracker {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<TrackerCommand>,
        mut positions: mpsc::Receiver<PositionEvent>,
        mut routes: mpsc::Receiver<RouteResponse>,
    ) {
        tracing::info!("Tracker started with {} stops", self.progress.stops().len());

        // The tracker keeps senders for positions and routes itself,
        // so only the command channel can close.
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    self.handle_command(command);
                }
                Some(event) = positions.recv() => self.handle_position(event),
                Some(response) = routes.recv() => {
                    if self.renderer.apply_route(response) {
                        tracing::debug!("Route {} applied", self.renderer.applied_sequence());
                    }
                }
            }
        }

        self.source.stop();
        tracing::info!("Tracker stopped");
    }

    fn handle_command(&mut self, command: TrackerCommand) {
        match command {
            TrackerCommand::StartTracking(mode, reply) => {
                self.start_tracking(mode);
                let _ = reply.send(self.snapshot());
            }
            TrackerCommand::StopTracking(reply) => {
                self.stop_tracking();
                let _ = reply.send(self.snapshot());
            }
            TrackerCommand::ToggleStop(stop_id, reply) => {
                let _ = reply.send(self.toggle_stop(stop_id));
            }
            TrackerCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            TrackerCommand::RouteFeature(reply) => {
                let _ = reply.send(self.renderer.route_feature());
            }
        }
    }

    fn start_tracking(&mut self, mode: FeedMode) {
        // Cancel the previous feed before anything of the new session exists
        self.source.stop();
        self.progress.start_session(Utc::now());

        match mode {
            FeedMode::Live => self.source.start_live(),
            FeedMode::Simulated => self.source.start_simulated(),
        }

        tracing::info!("Tracking started ({:?}), status: {}", mode, self.source.status());
    }

    fn stop_tracking(&mut self) {
        self.source.stop();
        self.progress.stop_session(Utc::now());

        if let Some(session) = self.progress.session() {
            tracing::info!(
                "Tracking stopped after {:.2} km, {:.2} kg CO2 saved",
                session.distance_km,
                session.co2_saved_kg
            );
        }
    }

    fn toggle_stop(&mut self, stop_id: u32) -> Result<ToggleResult, TrackerError> {
        let outcome = self.progress.try_toggle_stop(stop_id);
        match outcome {
            StopToggle::UnknownStop => return Err(TrackerError::UnknownStop(stop_id)),
            StopToggle::Ignored => tracing::debug!("Stop {} is not the current stop, ignoring", stop_id),
            StopToggle::Completed | StopToggle::Reopened => {
                tracing::info!("Stop {} {:?}, {}% done", stop_id, outcome, self.progress.progress_percent());
                let origin = self.latest_origin();
                self.renderer.refresh_route(origin, self.progress.remaining_stops());
            }
        }

        Ok(ToggleResult {
            outcome,
            stops: self.stop_views(),
        })
    }

    fn handle_position(&mut self, event: PositionEvent) {
        if !self.source.accepts(&event) {
            tracing::trace!("Dropping event from cancelled feed {}", event.generation);
            return;
        }

        match event.kind {
            PositionEventKind::Status(_) => {
                self.source.apply_status(&event);
                tracing::info!("Position source: {}", self.source.status());
            }
            PositionEventKind::Sample(sample) => self.handle_sample(sample),
        }
    }

    fn handle_sample(&mut self, sample: PositionSample) {
        let previous = self.progress.session().and_then(|session| session.last_position);

        if self.progress.record_sample(&sample).is_none() {
            return;
        }

        self.renderer.update_vehicle_marker(sample.position, previous);
        self.renderer.refresh_route(sample.position, self.progress.remaining_stops());
    }

    fn latest_origin(&self) -> Point {
        self.progress
            .session()
            .and_then(|session| session.last_position)
            .unwrap_or(self.fallback_origin)
    }

    fn stop_views(&self) -> Vec<StopView> {
        self.progress
            .stops()
            .iter()
            .enumerate()
            .map(|(i, stop)| StopView {
                id: stop.id,
                name: stop.name.clone(),
                position: stop.position,
                estimated_time: stop.estimated_time.clone(),
                completed: stop.completed,
                state: self.progress.stop_state(i).unwrap_or(StopState::Pending),
            })
            .collect()
    }

    fn snapshot(&self) -> TrackerSnapshot {
        let session = self.progress.session().map(|session| SessionView {
            running: session.running,
            started_at: session.started_at,
            ended_at: session.ended_at,
            distance_km: session.distance_km,
            co2_saved_kg: session.co2_saved_kg,
            last_position: session.last_position.map(LatLon::from),
            last_speed_kph: session.last_speed_kph,
            samples: session.sample_count,
        });

        TrackerSnapshot {
            status: self.source.status(),
            status_text: self.source.status().to_string(),
            session,
            stops: self.stop_views(),
            current_stop: self.progress.current_stop().map(|stop| stop.id),
            progress_percent: self.progress.progress_percent(),
            remaining_stops: self.progress.remaining_count(),
            estimated_minutes_remaining: self.progress.estimated_minutes_remaining(),
            map: self.renderer.map_view(),
        }
    }
}

/// Cheap to clone. Every call is a message to the tracker loop.
#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<TrackerCommand>,
}

impl TrackerHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> TrackerCommand) -> Result<T, TrackerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| TrackerError::TrackerStopped)?;
        reply_rx.await.map_err(|_| TrackerError::TrackerStopped)
    }

    /// Starts a new session, replacing the previous one and its position feed.
    pub async fn start_tracking(&self, mode: FeedMode) -> Result<TrackerSnapshot, TrackerError> {
        self.request(|reply| TrackerCommand::StartTracking(mode, reply)).await
    }

    pub async fn stop_tracking(&self) -> Result<TrackerSnapshot, TrackerError> {
        self.request(TrackerCommand::StopTracking).await
    }

    pub async fn toggle_stop(&self, stop_id: u32) -> Result<ToggleResult, TrackerError> {
        self.request(|reply| TrackerCommand::ToggleStop(stop_id, reply)).await?
    }

    pub async fn snapshot(&self) -> Result<TrackerSnapshot, TrackerError> {
        self.request(TrackerCommand::Snapshot).await
    }

    pub async fn route_feature(&self) -> Result<Option<geojson::Feature>, TrackerError> {
        self.request(TrackerCommand::RouteFeature).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use geo_types::LineString;
    use route_tracker_lib::{route_path::RouteGeometry, track_point::lat_lon};

    use super::*;

    struct EchoRouter;

    #[async_trait::async_trait]
    impl RoutingService for EchoRouter {
        async fn route(&self, waypoints: &[Point]) -> Result<RouteGeometry, TrackerError> {
            Ok(RouteGeometry {
                geometry: LineString::from(waypoints.iter().map(|p| (p.x(), p.y())).collect::<Vec<_>>()),
                distance_m: 0.0,
                duration_s: 0.0,
            })
        }
    }

    fn parts(interval: Duration) -> TrackerParts {
        TrackerParts {
            stops: vec![
                Stop::new(1, "One", 43.01, -2.0, "09:00"),
                Stop::new(2, "Two", 43.02, -2.0, "09:10"),
                Stop::new(3, "Three", 43.03, -2.0, "09:20"),
            ],
            sensor: None,
            simulator: Simulator::new(lat_lon(43.0, -2.0), interval, 0.001),
            routing: Arc::new(EchoRouter),
            depot: lat_lon(42.9, -2.0),
        }
    }

    async fn wait_for(handle: &TrackerHandle, check: impl Fn(&TrackerSnapshot) -> bool) -> TrackerSnapshot {
        for _ in 0..200 {
            let snapshot = handle.snapshot().await.unwrap();
            if check(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn toggles_follow_sequential_rule_and_refresh_route() {
        let (handle, _task) = spawn(parts(Duration::from_secs(60)));

        let result = handle.toggle_stop(2).await.unwrap();
        assert_eq!(result.outcome, StopToggle::Ignored);

        let result = handle.toggle_stop(1).await.unwrap();
        assert_eq!(result.outcome, StopToggle::Completed);
        assert_eq!(result.stops[1].state, StopState::Current);

        // No sample yet, so the route starts at the simulator base
        let snapshot = wait_for(&handle, |s| s.map.route.is_some()).await;
        let route = snapshot.map.route.unwrap();
        assert_eq!(route.waypoints[0], LatLon::new(43.0, -2.0));
        assert_eq!(route.waypoints.len(), 3);
        assert_eq!(snapshot.progress_percent, 33);
        assert_eq!(snapshot.current_stop, Some(2));
    }

    #[tokio::test]
    async fn unknown_stop_is_an_error() {
        let (handle, _task) = spawn(parts(Duration::from_secs(60)));
        assert_eq!(handle.toggle_stop(42).await, Err(TrackerError::UnknownStop(42)));
    }

    #[tokio::test]
    async fn simulated_session_accumulates_and_renders() {
        let (handle, _task) = spawn(parts(Duration::from_millis(10)));

        let snapshot = handle.start_tracking(FeedMode::Simulated).await.unwrap();
        assert_eq!(snapshot.status, SourceStatus::Demo);
        assert_eq!(snapshot.status_text, "Demo mode");
        assert!(snapshot.session.as_ref().unwrap().running);

        let snapshot = wait_for(&handle, |s| {
            s.session.as_ref().is_some_and(|session| session.samples >= 3) && s.map.route.is_some()
        })
        .await;

        let session = snapshot.session.unwrap();
        assert!(session.distance_km > 0.0);
        assert!((session.co2_saved_kg - session.distance_km * 0.12).abs() < 1e-9);
        assert!(snapshot.map.vehicle.unwrap().heading_deg.is_some());

        let stopped = handle.stop_tracking().await.unwrap();
        assert_eq!(stopped.status, SourceStatus::Stopped);
        let frozen = stopped.session.unwrap();
        assert!(!frozen.running);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let later = handle.snapshot().await.unwrap().session.unwrap();
        assert_eq!(later.samples, frozen.samples);
        assert_eq!(later.distance_km, frozen.distance_km);
    }

    #[tokio::test]
    async fn rendered_route_starts_at_latest_sample() {
        let (handle, _task) = spawn(parts(Duration::from_millis(10)));

        handle.start_tracking(FeedMode::Simulated).await.unwrap();
        wait_for(&handle, |s| s.session.as_ref().is_some_and(|session| session.samples >= 3)).await;
        handle.stop_tracking().await.unwrap();

        let snapshot = wait_for(&handle, |s| {
            s.map.route.as_ref().is_some_and(|route| route.sequence == s.map.requested_sequence)
        })
        .await;

        let last_position = snapshot.session.unwrap().last_position.unwrap();
        let route = snapshot.map.route.unwrap();
        assert_eq!(route.waypoints[0], last_position);
        assert_eq!(route.waypoints.len(), 4);
        assert_eq!(snapshot.map.vehicle.unwrap().position, last_position);
    }

    #[tokio::test]
    async fn restart_resets_session() {
        let (handle, _task) = spawn(parts(Duration::from_millis(10)));

        handle.start_tracking(FeedMode::Simulated).await.unwrap();
        wait_for(&handle, |s| s.session.as_ref().is_some_and(|session| session.samples >= 2)).await;

        let restarted = handle.start_tracking(FeedMode::Live).await.unwrap();
        let session = restarted.session.unwrap();
        assert_eq!(session.samples, 0);
        assert_eq!(session.distance_km, 0.0);
        // No sensor is configured, so live mode goes straight to the simulation
        assert_eq!(restarted.status, SourceStatus::DemoFallback);
    }
}
