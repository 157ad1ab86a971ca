use chrono::{NaiveDateTime, Utc};
use futures::{stream::BoxStream, Stream, StreamExt};
use nmea::{Nmea, SentenceType};
use route_tracker_lib::track_point::{lat_lon, PositionSample};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines},
    net::TcpStream,
};

use crate::TrackerError;

/// Samples from a subscribed sensor. Dropping the stream cancels the subscription.
pub type SampleStream = BoxStream<'static, Result<PositionSample, TrackerError>>;

/// A host location sensor.
#[async_trait::async_trait]
pub trait LocationSensor: Send + Sync {
    async fn subscribe(&self) -> Result<SampleStream, TrackerError>;
}

/// Reads NMEA 0183 sentences from a TCP feed, e.g. a GPS receiver behind a serial-to-TCP bridge.
pub struct NmeaTcpSensor {
    address: String,
}

impl NmeaTcpSensor {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait::async_trait]
impl LocationSensor for NmeaTcpSensor {
    async fn subscribe(&self) -> Result<SampleStream, TrackerError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|err| TrackerError::Sensor(format!("failed to connect to {}: {err}", self.address)))?;

        tracing::info!("Connected to location sensor at {}", self.address);
        Ok(nmea_samples(BufReader::new(stream).lines()).boxed())
    }
}

/// Turns a line reader into a stream of samples.
/// The stream yields one error and ends when the reader closes or fails.
pub fn nmea_samples<R>(lines: Lines<R>) -> impl Stream<Item = Result<PositionSample, TrackerError>> + Send
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    futures::stream::unfold(Some((lines, NmeaParser::default())), |state| async move {
        let (mut lines, mut parser) = state?;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(sample) = parser.parse_line(&line) {
                        return Some((Ok(sample), Some((lines, parser))));
                    }
                }
                Ok(None) => return Some((Err(TrackerError::Sensor("sensor feed closed".into())), None)),
                Err(err) => return Some((Err(TrackerError::Sensor(format!("failed to read sensor feed: {err}"))), None)),
            }
        }
    })
}

#[derive(Default)]
pub struct NmeaParser {
    nmea: Nmea,
}

impl NmeaParser {
    /// Feeds one sentence. Returns a sample after each RMC or GGA sentence that carries a fix.
    pub fn parse_line(&mut self, line: &str) -> Option<PositionSample> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match self.nmea.parse(line) {
            Ok(SentenceType::RMC) | Ok(SentenceType::GGA) => {}
            Ok(_) => return None,
            Err(err) => {
                tracing::debug!("Skipping NMEA sentence {:?}: {:?}", line, err);
                return None;
            }
        }

        let latitude = self.nmea.latitude?;
        let longitude = self.nmea.longitude?;
        let speed_knots = self.nmea.speed_over_ground.unwrap_or(0.0);

        let timestamp = match (self.nmea.fix_date, self.nmea.fix_time) {
            (Some(date), Some(time)) => NaiveDateTime::new(date, time).and_utc(),
            _ => Utc::now(),
        };

        Some(PositionSample::new(
            lat_lon(latitude, longitude),
            speed_knots as f64 * 1.852, // Knots to km/h
            timestamp,
        ))
    }
}
