//! URL-driven endpoints: website capture and remote video download

use std::fmt;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::Response,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    models::{CaptureRequest, VideoDownloadRequest},
    state::AppState,
    utils::{TempArtifacts, content_type_for, file_response, scratch_path},
    validation,
};
use crate::api::error::ApiError;
use crate::download::{DownloadError, DownloadRequest, MediaFormat, download_media, sanitize_title};
use crate::progress::{ProgressRecord, TaskId, TaskProgress};
use crate::tools::{ToolError, convert};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureFormat {
    Pdf,
    Png,
    Jpg,
}

impl CaptureFormat {
    fn parse(value: &str) -> Result<Self, ApiError> {
        match value.to_ascii_lowercase().as_str() {
            "pdf" => Ok(CaptureFormat::Pdf),
            "png" => Ok(CaptureFormat::Png),
            "jpg" | "jpeg" => Ok(CaptureFormat::Jpg),
            other => Err(ApiError::InvalidInput(format!(
                "unsupported capture format '{other}', expected pdf, png or jpg"
            ))),
        }
    }

    fn extension(self) -> &'static str {
        match self {
            CaptureFormat::Pdf => "pdf",
            CaptureFormat::Png => "png",
            CaptureFormat::Jpg => "jpg",
        }
    }

    fn stage_message(self) -> &'static str {
        match self {
            CaptureFormat::Pdf => "Converting to PDF...",
            CaptureFormat::Png => "Taking PNG screenshot...",
            CaptureFormat::Jpg => "Taking JPG screenshot...",
        }
    }
}

/// Failure as written to the progress record
///
/// Tool failures carry a stage label in the record; the HTTP error body
/// keeps the wording of the underlying error.
struct StageError<E> {
    label: Option<&'static str>,
    error: E,
}

impl<E: fmt::Display> fmt::Display for StageError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label {
            Some(label) => write!(f, "{label}: {}", self.error),
            None => self.error.fmt(f),
        }
    }
}

fn capture_stage(error: ToolError) -> StageError<ToolError> {
    let label = matches!(error, ToolError::Failed { .. } | ToolError::MissingOutput { .. })
        .then_some("Capture error");
    StageError { label, error }
}

fn download_stage(error: DownloadError) -> StageError<DownloadError> {
    let label = matches!(error, DownloadError::Rejected { .. } | DownloadError::Failed { .. })
        .then_some("yt-dlp error");
    StageError { label, error }
}

/// POST /api/capture/{format}
#[instrument(skip_all)]
pub async fn capture_website(
    State(state): State<AppState>,
    Path(format): Path<String>,
    payload: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let format = CaptureFormat::parse(&format)?;
    let url = validation::http_url(request.url.as_deref())?;
    let task_id = request.task_id.map(TaskId::parse).transpose()?;

    let extension = format.extension();
    let output = scratch_path(&state.config.server.temp_dir, &format!("capture.{extension}"));
    let mut artifacts = TempArtifacts::new();
    artifacts.track(output.clone());
    tokio::fs::create_dir_all(&state.config.server.temp_dir).await?;

    let tools = state.tools.clone();
    let target = output.clone();
    state
        .invoker
        .run(
            task_id.clone(),
            ProgressRecord::processing(10, "Capturing website..."),
            "Capture complete",
            |progress: TaskProgress| async move {
                progress.processing(50, format.stage_message());
                let captured = match format {
                    CaptureFormat::Pdf => convert::capture_pdf(&tools, &url, &target).await,
                    CaptureFormat::Png | CaptureFormat::Jpg => {
                        convert::capture_image(&tools, &url, &target, extension).await
                    }
                };
                captured.map_err(capture_stage)
            },
        )
        .await
        .map_err(|stage| ApiError::capture(stage.error))?;

    file_response(
        &output,
        &format!("website.{extension}"),
        content_type_for(extension),
        artifacts,
        task_id.as_ref(),
    )
    .await
}

/// POST /api/youtube/download
///
/// Tries each configured client profile in turn until the host accepts
/// one; the file is named after the video title.
#[instrument(skip_all)]
pub async fn download_video(
    State(state): State<AppState>,
    payload: Result<Json<VideoDownloadRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let url = validation::http_url(request.url.as_deref())?;
    let format = MediaFormat::parse(&request.format).ok_or_else(|| {
        ApiError::InvalidInput(format!(
            "unsupported format '{}', expected mp4 or mp3",
            request.format
        ))
    })?;
    let task_id = request.task_id.map(TaskId::parse).transpose()?;

    let scratch = &state.config.server.temp_dir;
    tokio::fs::create_dir_all(scratch).await?;
    let download = DownloadRequest {
        url,
        format,
        output_stem: scratch.join(format!("yt_{}", Uuid::new_v4())),
    };

    let mut artifacts = TempArtifacts::new();
    for path in download.artifact_paths() {
        artifacts.track(path);
    }

    let downloader = state.downloader.clone();
    let profiles = state.config.youtube.profiles.clone();
    let metrics = state.metrics.clone();
    let media = state
        .invoker
        .run(
            task_id.clone(),
            ProgressRecord::starting("Initializing download..."),
            "Download complete",
            |progress: TaskProgress| async move {
                download_media(downloader.as_ref(), &profiles, &download, &progress, &metrics)
                    .await
                    .map_err(download_stage)
            },
        )
        .await
        .map_err(|stage| ApiError::from(stage.error))?;

    info!(title = %media.title, path = %media.path.display(), "Video downloaded");

    let download_name = format!("{}.{}", sanitize_title(&media.title), format.extension());
    file_response(
        &media.path,
        &download_name,
        format.mime(),
        artifacts,
        task_id.as_ref(),
    )
    .await
}
