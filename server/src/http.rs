use std::path::PathBuf;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::services::{ServeDir, ServeFile};

use crate::{position::FeedMode, tracker::TrackerHandle, TrackerError};

#[derive(Deserialize)]
struct StartParams {
    #[serde(default)]
    mode: FeedMode,
}

/// The dashboard API. `static_dir` is served as a fallback when set.
pub fn router(tracker: TrackerHandle, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/tracking/start", post(start_tracking))
        .route("/api/tracking/stop", post(stop_tracking))
        .route("/api/stops/{stop_id}/toggle", post(toggle_stop))
        .route("/api/route", get(get_route))
        .with_state(tracker);

    match static_dir {
        Some(dir) => {
            let index = dir.join("index.html");
            api.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)))
        }
        None => api,
    }
}

fn error_response(err: TrackerError) -> Response {
    let status = match err {
        TrackerError::UnknownStop(_) => StatusCode::NOT_FOUND,
        TrackerError::TrackerStopped => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    tracing::error!("Request failed: {}", err);
    (status, err.to_string()).into_response()
}

async fn get_status(State(tracker): State<TrackerHandle>) -> Response {
    match tracker.snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => error_response(err),
    }
}

async fn start_tracking(State(tracker): State<TrackerHandle>, Query(params): Query<StartParams>) -> Response {
    match tracker.start_tracking(params.mode).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => error_response(err),
    }
}

async fn stop_tracking(State(tracker): State<TrackerHandle>) -> Response {
    match tracker.stop_tracking().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => error_response(err),
    }
}

async fn toggle_stop(State(tracker): State<TrackerHandle>, Path(stop_id): Path<u32>) -> Response {
    match tracker.toggle_stop(stop_id).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_route(State(tracker): State<TrackerHandle>) -> Response {
    match tracker.route_feature().await {
        Ok(Some(feature)) => Json(feature).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}
