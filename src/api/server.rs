use std::net::SocketAddr;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    decompression::RequestDecompressionLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use super::{convert, media, services, state::AppState};
use crate::config::Config;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All routes over `state`
pub fn router(state: AppState) -> Router {
    let server = &state.config.server;
    let body_limit = server.max_upload_bytes.as_usize();
    let enable_cors = server.enable_cors;
    let static_dir = server.static_dir.clone();

    let api = Router::new()
        .route("/health", get(services::health))
        .route("/ready", get(services::ready))
        .route("/api/progress/{task_id}", get(services::progress_stream))
        .route("/api/youtube/progress/{task_id}", get(services::progress_stream))
        .route("/api/image/convert", post(convert::convert_image))
        .route("/api/image/to-pdf", post(convert::images_to_pdf))
        .route("/api/pdf/to-images", post(convert::pdf_to_images))
        .route("/api/audio/convert", post(convert::convert_audio))
        .route("/api/video/convert", post(convert::convert_video))
        .route("/api/video/to-gif", post(convert::video_to_gif))
        .route("/api/office/convert", post(convert::convert_office))
        .route("/api/office/to-pdf", post(convert::office_to_pdf))
        .route("/api/presentation/convert", post(convert::convert_presentation))
        .route("/api/spreadsheet/convert", post(convert::convert_spreadsheet))
        .route("/api/ebook/convert", post(convert::convert_ebook))
        .route("/api/vector/convert", post(convert::convert_vector))
        .route("/api/font/convert", post(convert::convert_font))
        .route("/api/ocr/image", post(convert::ocr_image))
        .route("/api/ocr/pdf", post(convert::ocr_pdf))
        .route("/api/optimize/{tool}", post(convert::optimize_file))
        .route("/api/capture/{format}", post(media::capture_website))
        .route("/api/youtube/download", post(media::download_video))
        .with_state(state);

    // Single-page client: unknown paths fall back to its index
    let app = match static_dir {
        Some(dir) => {
            let index = ServeFile::new(dir.join("index.html"));
            api.fallback_service(ServeDir::new(dir).fallback(index))
        }
        None => api,
    };

    let app = app
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app.layer(CorsLayer::very_permissive())
    } else {
        app
    }
}

/// Serve until Ctrl+C or SIGTERM, then stop the cleanup worker
pub async fn run(config: Config) -> Result<(), AnyError> {
    let address: SocketAddr = config.server.bind_addr;
    let scratch = config.server.temp_dir.clone();

    tokio::fs::create_dir_all(&scratch)
        .await
        .map_err(|e| format!("Failed to create temp dir {}: {}", scratch.display(), e))?;

    let shutdown = CancellationToken::new();
    let (state, cleanup_worker) = AppState::new(config, shutdown.clone());

    let missing: Vec<_> = state
        .tools
        .availability()
        .into_iter()
        .filter(|status| status.resolved.is_none())
        .map(|status| status.binary)
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "Some conversion tools are not on PATH");
    }

    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, temp_dir = %scratch.display(), "ConvertBox API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Err(e) = cleanup_worker.await {
        error!(error = %e, "Cleanup worker ended abnormally");
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
