use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
};
use thiserror::Error;

use super::models::ErrorResponse;
use crate::download::DownloadError;
use crate::progress::InvalidTaskId;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("Download failed: {0}")]
    DownloadFailed(String),
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
    #[error("{0}")]
    ConversionFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::DownloadFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::CaptureFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::ConversionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::DownloadFailed(_) => "DOWNLOAD_FAILED",
            ApiError::CaptureFailed(_) => "CAPTURE_FAILED",
            ApiError::ConversionFailed(_) => "CONVERSION_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Failure of a capture tool, reported as a client error like the
    /// original tool exit
    pub fn capture(error: ToolError) -> Self {
        match error {
            ToolError::Failed { .. } | ToolError::MissingOutput { .. } => {
                ApiError::CaptureFailed(error.to_string())
            }
            other => ApiError::from(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ToolError> for ApiError {
    fn from(value: ToolError) -> Self {
        match value {
            ToolError::UnsupportedFormat(message) => ApiError::InvalidInput(message),
            other => ApiError::ConversionFailed(other.to_string()),
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(value: DownloadError) -> Self {
        match value {
            DownloadError::Rejected { .. } | DownloadError::Failed { .. } => {
                ApiError::DownloadFailed(value.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<InvalidTaskId> for ApiError {
    fn from(value: InvalidTaskId) -> Self {
        ApiError::InvalidInput(value.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(value: MultipartError) -> Self {
        if value.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(value.body_text())
        } else {
            ApiError::InvalidInput(value.body_text())
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(value: MultipartRejection) -> Self {
        ApiError::InvalidInput(value.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        ApiError::InvalidInput(value.body_text())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(value: std::io::Error) -> Self {
        ApiError::Internal(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_errors_map_to_statuses() {
        let failed = ToolError::Failed {
            program: "ffmpeg".to_string(),
            code: Some(1),
            stderr: String::new(),
        };
        let error = ApiError::from(failed);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.to_string(), "ffmpeg exit 1");

        let unsupported = ApiError::from(ToolError::UnsupportedFormat("nope".to_string()));
        assert_eq!(unsupported.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_capture_failures_are_client_errors() {
        let error = ApiError::capture(ToolError::Failed {
            program: "wkhtmltopdf".to_string(),
            code: Some(1),
            stderr: "Exit with code 1 due to network error: HostNotFoundError".to_string(),
        });
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(error.to_string().starts_with("Capture failed: wkhtmltopdf exit 1"));

        let missing = ApiError::capture(ToolError::NotFound {
            program: "wkhtmltopdf".to_string(),
        });
        assert_eq!(missing.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_download_errors() {
        let rejected = ApiError::from(DownloadError::Rejected {
            profile: "ios".to_string(),
            message: "ERROR: Sign in to confirm you're not a bot".to_string(),
        });
        assert_eq!(rejected.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            rejected.to_string(),
            "Download failed: ERROR: Sign in to confirm you're not a bot"
        );

        let missing = ApiError::from(DownloadError::OutputMissing);
        assert_eq!(missing.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
