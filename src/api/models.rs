//! Request and response bodies of the JSON endpoints.
//!
//! Upload conversions take `multipart/form-data` and answer with the
//! converted file; only capture and video download take JSON:
//!
//! ```json
//! { "url": "https://www.youtube.com/watch?v=...", "format": "mp3", "task_id": "yt-1700000000" }
//! ```
//!
//! Failures of every endpoint share [`ErrorResponse`].

use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;

/// `POST /api/capture/{format}`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
}

/// `POST /api/youtube/download`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoDownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_media_format")]
    pub format: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

fn default_media_format() -> String {
    "mp4".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_request_defaults_to_mp4() {
        let request: VideoDownloadRequest =
            serde_json::from_str(r#"{"url": "https://youtu.be/x"}"#).unwrap();
        assert_eq!(request.format, "mp4");
        assert_eq!(request.task_id, None);
    }

    #[test]
    fn test_error_response_shape() {
        let body = serde_json::to_value(ErrorResponse {
            error: "URL is required".to_string(),
            code: "INVALID_INPUT",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"error": "URL is required", "code": "INVALID_INPUT"}));
    }
}
