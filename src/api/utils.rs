//! Scratch files, multipart intake and file responses

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::Multipart;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::progress::TaskId;

pub const TASK_ID_HEADER: HeaderName = HeaderName::from_static("x-task-id");

/// File name reduced to `[A-Za-z0-9._-]`, never empty or hidden
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();

    if cleaned.is_empty() { "file".to_string() } else { cleaned }
}

/// Unique scratch path for an uploaded or produced file
pub fn scratch_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}_{}", Uuid::new_v4(), secure_filename(name)))
}

/// Stem of the uploaded name, used to name converted downloads
pub fn display_stem(original_name: &str) -> String {
    let name = secure_filename(original_name);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Paths removed when the guard is dropped
///
/// A response body takes ownership of the guard so inputs and outputs
/// disappear once the client has received the file or gone away.
#[derive(Debug, Default)]
pub struct TempArtifacts {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl TempArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    pub fn track_dir(&mut self, path: impl Into<PathBuf>) {
        self.dirs.push(path.into());
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        for path in self.files.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed temp file"),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => debug!(%error, path = %path.display(), "Failed to remove temp file"),
            }
        }
        for dir in self.dirs.drain(..) {
            if let Err(error) = std::fs::remove_dir_all(&dir) {
                if error.kind() != std::io::ErrorKind::NotFound {
                    debug!(%error, path = %dir.display(), "Failed to remove temp dir");
                }
            }
        }
    }
}

/// MIME type for a produced file extension
pub fn content_type_for(ext: &str) -> mime::Mime {
    let essence = match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jfif" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "eps" | "ps" => "application/postscript",
        "zip" => "application/zip",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "txt" => "text/plain",
        "html" => "text/html",
        "csv" => "text/csv",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "epub" => "application/epub+zip",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };
    essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name
pub fn content_disposition(download_name: &str) -> HeaderValue {
    let fallback: String = download_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' || c == ' ' { c } else { '_' })
        .collect();

    let mut encoded = String::with_capacity(download_name.len());
    for byte in download_name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_' | b'~') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Stream `path` back as a download. `artifacts` lives as long as the body.
pub async fn file_response(
    path: &Path,
    download_name: &str,
    content_type: mime::Mime,
    artifacts: TempArtifacts,
    task_id: Option<&TaskId>,
) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path).await?;
    let length = file.metadata().await?.len();

    let stream = ReaderStream::new(file).map(move |chunk| {
        let _held = &artifacts;
        chunk
    });

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(content_type.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(download_name));
    if let Some(task_id) = task_id {
        if let Ok(value) = HeaderValue::from_str(task_id.as_str()) {
            headers.insert(TASK_ID_HEADER, value);
        }
    }

    Ok((headers, Body::from_stream(stream)).into_response())
}

/// One uploaded file, already on disk
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub original_name: String,
    pub path: PathBuf,
}

/// A multipart form with its files spooled into the scratch directory
#[derive(Debug)]
pub struct UploadForm {
    pub files: Vec<StoredUpload>,
    fields: HashMap<String, String>,
    pub artifacts: TempArtifacts,
}

impl UploadForm {
    /// Spool every file part into `dir` and collect the text parts.
    /// Parts with an empty file name are skipped like an unset file input.
    pub async fn read(mut multipart: Multipart, dir: &Path) -> Result<Self, ApiError> {
        tokio::fs::create_dir_all(dir).await?;

        let mut files = Vec::new();
        let mut fields = HashMap::new();
        let mut artifacts = TempArtifacts::new();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            let Some(file_name) = field.file_name().map(str::to_string) else {
                let text = field.text().await?;
                fields.insert(name, text);
                continue;
            };
            if file_name.is_empty() {
                continue;
            }

            let path = scratch_path(dir, &file_name);
            artifacts.track(path.clone());

            let mut file = tokio::fs::File::create(&path).await?;
            while let Some(chunk) = field.chunk().await? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;

            files.push(StoredUpload {
                original_name: file_name,
                path,
            });
        }

        Ok(Self {
            files,
            fields,
            artifacts,
        })
    }

    /// Non-blank text field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn task_id(&self) -> Result<Option<TaskId>, ApiError> {
        self.field("task_id")
            .map(TaskId::parse)
            .transpose()
            .map_err(ApiError::from)
    }

    /// The first uploaded file; single-file endpoints ignore the rest
    pub fn single_file(&self) -> Result<StoredUpload, ApiError> {
        self.files
            .first()
            .cloned()
            .ok_or_else(|| ApiError::InvalidInput("No file provided".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("report final.docx"), "report_final.docx");
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\me\\photo.png"), "photo.png");
        assert_eq!(secure_filename(".hidden"), "hidden");
        assert_eq!(secure_filename("日本語"), "file");
    }

    #[test]
    fn test_scratch_path_is_unique() {
        let dir = Path::new("/tmp");
        let a = scratch_path(dir, "in.png");
        let b = scratch_path(dir, "in.png");
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_string_lossy().ends_with("_in.png"));
    }

    #[test]
    fn test_display_stem() {
        assert_eq!(display_stem("holiday photo.heic"), "holiday_photo");
        assert_eq!(display_stem("noext"), "noext");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("PNG").essence_str(), "image/png");
        assert_eq!(content_type_for("mp3").essence_str(), "audio/mpeg");
        assert_eq!(content_type_for("unknown"), mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn test_content_disposition_encodes_non_ascii() {
        let value = content_disposition("café.mp3");
        let value = value.to_str().unwrap();
        assert!(value.starts_with("attachment; filename=\"caf_.mp3\""));
        assert!(value.ends_with("filename*=UTF-8''caf%C3%A9.mp3"));
    }

    #[test]
    fn test_temp_artifacts_removed_on_drop() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("input.bin");
        let nested = dir.path().join("out");
        std::fs::write(&file, b"data").unwrap();
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("a.pdf"), b"pdf").unwrap();

        let mut artifacts = TempArtifacts::new();
        artifacts.track(&file);
        artifacts.track(dir.path().join("never-created"));
        artifacts.track_dir(&nested);
        drop(artifacts);

        assert!(!file.exists());
        assert!(!nested.exists());
    }
}
