use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::{
    models::{HealthResponse, ReadyResponse},
    state::AppState,
};
use crate::api::error::ApiError;
use crate::progress::TaskId;

/// Liveness plus the process counters
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "converter-api",
        version: env!("CARGO_PKG_VERSION"),
        metrics: state.metrics.snapshot(),
    })
}

/// Ready once the scratch directory accepts writes
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let dir = &state.config.server.temp_dir;
    let probe = dir.join(format!(".ready-{}", uuid::Uuid::new_v4()));

    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&probe, b"ok").await?;
        tokio::fs::remove_file(&probe).await
    }
    .await;

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready",
                error: None,
            }),
        ),
        Err(error) => {
            warn!(%error, dir = %dir.display(), "Scratch directory not writable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    status: "not ready",
                    error: Some(error.to_string()),
                }),
            )
        }
    }
}

/// Server-sent progress for one task (GET /api/progress/{task_id})
///
/// Each event carries one record as JSON. The stream ends after a
/// `complete` or `error` record; for an id nobody has written yet it
/// stays open until the configured idle timeout.
pub async fn progress_stream(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let task_id = TaskId::parse(task_id)?;
    state.metrics.stream_opened();
    debug!(task_id = %task_id, "Progress stream opened");

    let events = state.reporter.subscribe(task_id).map(|record| {
        let event = Event::default().json_data(&record).unwrap_or_else(|error| {
            warn!(%error, "Failed to encode progress record");
            Event::default().comment("encode error")
        });
        Ok::<_, Infallible>(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
