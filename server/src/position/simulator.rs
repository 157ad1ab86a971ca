use std::time::Duration;

use chrono::Utc;
use geo_types::Point;
use rand::{rngs::StdRng, Rng, SeedableRng};
use route_tracker_lib::track_point::{lat_lon, PositionSample};

use super::Feed;

/// Synthetic positions scattered around a base coordinate.
/// Used for demos and whenever the live sensor is unavailable.
#[derive(Debug, Clone)]
pub struct Simulator {
    pub base: Point,
    pub interval: Duration,
    pub jitter_deg: f64,
}

impl Simulator {
    pub fn new(base: Point, interval: Duration, jitter_deg: f64) -> Self {
        Self {
            base,
            interval,
            jitter_deg,
        }
    }

    pub fn sample(&self, rng: &mut impl Rng) -> PositionSample {
        let jitter = self.jitter_deg.abs();
        let (d_lat, d_lon) = if jitter > 0.0 {
            (rng.random_range(-jitter..jitter), rng.random_range(-jitter..jitter))
        } else {
            (0.0, 0.0)
        };

        PositionSample::new(
            lat_lon(self.base.y() + d_lat, self.base.x() + d_lon),
            rng.random_range(10.0..60.0),
            Utc::now(),
        )
    }

    /// Emits one sample per interval until the receiving side goes away.
    pub(crate) async fn run(&self, feed: &Feed) {
        let mut rng = StdRng::from_os_rng();
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;
            if !feed.sample(self.sample(&mut rng)).await {
                tracing::debug!("Simulation receiver closed");
                return;
            }
        }
    }
}
