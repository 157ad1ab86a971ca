use std::{fmt, sync::Arc};

use futures::StreamExt;
use route_tracker_lib::track_point::PositionSample;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};

mod sensor;
mod simulator;

pub use sensor::*;
pub use simulator::Simulator;

/// Where positions currently come from, shown to the user as a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Stopped,
    RequestingGps,
    GpsObtained,
    Demo,
    /// The live sensor failed or is missing, positions are simulated.
    DemoFallback,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceStatus::Stopped => "Stopped",
            SourceStatus::RequestingGps => "Requesting GPS...",
            SourceStatus::GpsObtained => "GPS obtained",
            SourceStatus::Demo => "Demo mode",
            SourceStatus::DemoFallback => "Demo mode (GPS unavailable)",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    #[default]
    Live,
    Simulated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionEventKind {
    Sample(PositionSample),
    Status(SourceStatus),
}

/// Something a feed produced. `generation` identifies the feed,
/// so events still queued from a cancelled feed can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEvent {
    pub generation: u64,
    pub kind: PositionEventKind,
}

/// The sending half handed to a feed task.
#[derive(Clone)]
pub(crate) struct Feed {
    generation: u64,
    tx: mpsc::Sender<PositionEvent>,
}

impl Feed {
    /// Returns false once nobody is listening anymore.
    pub(crate) async fn sample(&self, sample: PositionSample) -> bool {
        self.send(PositionEventKind::Sample(sample)).await
    }

    pub(crate) async fn status(&self, status: SourceStatus) -> bool {
        self.send(PositionEventKind::Status(status)).await
    }

    async fn send(&self, kind: PositionEventKind) -> bool {
        self.tx
            .send(PositionEvent {
                generation: self.generation,
                kind,
            })
            .await
            .is_ok()
    }
}

/// Produces vehicle positions from the live sensor, falling back to the simulator.
///
/// At most one feed task exists at a time. Starting a feed always aborts the
/// previous one first, and every feed gets a new generation number.
pub struct PositionSource {
    sensor: Option<Arc<dyn LocationSensor>>,
    simulator: Simulator,
    events: mpsc::Sender<PositionEvent>,
    feed: Option<JoinHandle<()>>,
    generation: u64,
    status: SourceStatus,
}

impl PositionSource {
    pub fn new(sensor: Option<Arc<dyn LocationSensor>>, simulator: Simulator, events: mpsc::Sender<PositionEvent>) -> Self {
        Self {
            sensor,
            simulator,
            events,
            feed: None,
            generation: 0,
            status: SourceStatus::Stopped,
        }
    }

    pub fn status(&self) -> SourceStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.feed.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn next_feed(&mut self) -> Feed {
        self.stop();
        self.generation += 1;
        Feed {
            generation: self.generation,
            tx: self.events.clone(),
        }
    }

    /// Subscribes to the live sensor. Sensor failures switch the same feed over to the simulator.
    pub fn start_live(&mut self) {
        let feed = self.next_feed();
        let simulator = self.simulator.clone();

        let Some(sensor) = self.sensor.clone() else {
            tracing::warn!("No location sensor configured, using simulated positions");
            self.status = SourceStatus::DemoFallback;
            self.feed = Some(tokio::spawn(async move {
                simulator.run(&feed).await;
            }));
            return;
        };

        self.status = SourceStatus::RequestingGps;
        self.feed = Some(tokio::spawn(async move {
            run_live(sensor.as_ref(), &feed).await;

            if feed.status(SourceStatus::DemoFallback).await {
                simulator.run(&feed).await;
            }
        }));
    }

    pub fn start_simulated(&mut self) {
        let feed = self.next_feed();
        let simulator = self.simulator.clone();

        self.status = SourceStatus::Demo;
        self.feed = Some(tokio::spawn(async move {
            simulator.run(&feed).await;
        }));
    }

    /// Cancels the running feed, if any.
    pub fn stop(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
            tracing::debug!("Position feed {} cancelled", self.generation);
        }
        self.status = SourceStatus::Stopped;
    }

    /// Whether an event comes from the feed that is currently running.
    pub fn accepts(&self, event: &PositionEvent) -> bool {
        self.feed.is_some() && event.generation == self.generation
    }

    /// Applies a status change reported by the running feed.
    pub fn apply_status(&mut self, event: &PositionEvent) {
        if let PositionEventKind::Status(status) = event.kind {
            if self.accepts(event) {
                self.status = status;
            }
        }
    }
}

impl Drop for PositionSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Forwards sensor samples until the sensor fails or the receiver goes away.
async fn run_live(sensor: &dyn LocationSensor, feed: &Feed) {
    let mut samples = match sensor.subscribe().await {
        Ok(samples) => samples,
        Err(err) => {
            tracing::warn!("Location sensor unavailable: {}", err);
            return;
        }
    };

    let mut obtained = false;
    while let Some(item) = samples.next().await {
        match item {
            Ok(sample) => {
                if !obtained {
                    obtained = true;
                    feed.status(SourceStatus::GpsObtained).await;
                }
                if !feed.sample(sample).await {
                    return;
                }
            }
            Err(err) => {
                tracing::warn!("Location sensor failed: {}", err);
                return;
            }
        }
    }

    tracing::warn!("Location sensor stream ended");
}
