use std::{fs::OpenOptions, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use server::{
    configuration::Configuration,
    http,
    position::{FeedMode, LocationSensor, NmeaTcpSensor, Simulator},
    routing::OsrmClient,
    tracker::{self, TrackerParts},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "route_tracker")]
#[command(about = "Live route tracking for the fleet dashboard", long_about = None)]
struct Cli {
    /// Path to a key = value configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start a simulated tracking session right away
    #[arg(long, conflicts_with = "live")]
    simulate: bool,

    /// Start a live tracking session right away
    #[arg(long)]
    live: bool,

    /// Overrides the configured port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Configuration::load(path)?,
        None => Configuration::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("failed to create log directory {:?}", config.log_dir))?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_dir.join("tracker.log"))
        .context("failed to open log file")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=trace,server=trace", env!("CARGO_CRATE_NAME")).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(log_file))
        .init();

    tracing::info!("Starting route tracker...");

    let itinerary = config.load_itinerary()?;
    let sensor = config
        .sensor_address
        .as_ref()
        .map(|address| Arc::new(NmeaTcpSensor::new(address.clone())) as Arc<dyn LocationSensor>);
    let routing = OsrmClient::new(config.routing_url.clone(), config.routing_timeout)?;

    let (tracker, tracker_task) = tracker::spawn(TrackerParts {
        stops: itinerary.into_stops(),
        sensor,
        simulator: Simulator::new(config.base, config.simulation_interval, config.simulation_jitter_deg),
        routing: Arc::new(routing),
        depot: config.depot,
    });

    if cli.simulate || cli.live {
        let mode = if cli.simulate { FeedMode::Simulated } else { FeedMode::Live };
        let snapshot = tracker.start_tracking(mode).await?;
        tracing::info!("Tracking from startup: {}", snapshot.status_text);
    }

    let app = http::router(tracker, config.static_dir.clone());

    let addr = SocketAddr::from((config.bind_address, config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    // The router owned the last handle, so the tracker loop winds down now
    tracker_task.await?;

    Ok(())
}
