use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument};

use super::profiles::ClientProfile;
use super::strategy::{IsRejection, NoProfiles, try_profiles};
use crate::config::YoutubeConfig;
use crate::observability::Metrics;
use crate::progress::TaskProgress;
use crate::tools::{Tool, ToolError, ToolRunner, stderr_tail};

/// Extensions yt-dlp may leave behind, probed in this order
pub const OUTPUT_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mp3", "m4a"];

/// Partial-download leftovers removed together with the output
const PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl"];

const TITLE_MARKER: &str = "[convertbox] title=";

const MAX_TITLE_CHARS: usize = 50;

static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+(\d{1,3}(?:\.\d+)?)%").expect("progress pattern is valid")
});

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Upstream refused this client identity
    #[error("{message}")]
    Rejected { profile: String, message: String },

    #[error("{message}")]
    Failed { profile: String, message: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Output file not found after download.")]
    OutputMissing,

    #[error(transparent)]
    NoProfiles(#[from] NoProfiles),
}

impl IsRejection for DownloadError {
    fn is_rejection(&self) -> bool {
        matches!(self, DownloadError::Rejected { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Mp4,
    Mp3,
}

impl MediaFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "mp4" => Some(MediaFormat::Mp4),
            "mp3" => Some(MediaFormat::Mp3),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mp3 => "mp3",
        }
    }

    pub fn mime(self) -> mime::Mime {
        match self {
            MediaFormat::Mp4 => "video/mp4".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
            MediaFormat::Mp3 => "audio/mpeg".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub format: MediaFormat,
    /// Output path without extension; yt-dlp appends the real one
    pub output_stem: PathBuf,
}

impl DownloadRequest {
    /// Every file a download into `output_stem` may have created
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.output_stem.clone()];
        for ext in OUTPUT_EXTENSIONS.iter().chain(PARTIAL_EXTENSIONS) {
            paths.push(with_extension(&self.output_stem, ext));
        }
        paths
    }

    /// First existing output, by extension priority, then the bare stem
    pub fn locate_output(&self) -> Option<PathBuf> {
        OUTPUT_EXTENSIONS
            .iter()
            .map(|ext| with_extension(&self.output_stem, ext))
            .chain(std::iter::once(self.output_stem.clone()))
            .find(|path| path.is_file())
    }
}

fn with_extension(stem: &Path, ext: &str) -> PathBuf {
    let mut path = stem.as_os_str().to_owned();
    path.push(".");
    path.push(ext);
    PathBuf::from(path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub path: PathBuf,
    pub title: String,
}

/// One download attempt with one client identity
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn fetch(
        &self,
        request: &DownloadRequest,
        profile: &ClientProfile,
        progress: &TaskProgress,
    ) -> Result<DownloadedMedia, DownloadError>;
}

/// Download `request`, falling back through `profiles` on rejections
pub async fn download_media(
    downloader: &dyn MediaDownloader,
    profiles: &[ClientProfile],
    request: &DownloadRequest,
    progress: &TaskProgress,
    metrics: &Metrics,
) -> Result<DownloadedMedia, DownloadError> {
    try_profiles(profiles, |profile| async move {
        let result = downloader.fetch(request, profile, progress).await;
        if matches!(&result, Err(error) if error.is_rejection()) {
            metrics.profile_rejected();
        }
        result
    })
    .await
}

/// `MediaDownloader` backed by the yt-dlp command line
pub struct YtDlpDownloader {
    runner: ToolRunner,
    settings: Arc<YoutubeConfig>,
}

impl YtDlpDownloader {
    pub fn new(runner: ToolRunner, settings: YoutubeConfig) -> Self {
        Self {
            runner,
            settings: Arc::new(settings),
        }
    }

    fn classify(&self, profile: &ClientProfile, error: ToolError) -> DownloadError {
        let ToolError::Failed { stderr, .. } = &error else {
            return DownloadError::Tool(error);
        };

        let message = failure_message(stderr).unwrap_or_else(|| error.to_string());
        let profile = profile.name.clone();

        // Only the final ERROR line counts; warnings may mention sign-in too
        if is_rejection_message(&message, &self.settings.rejection_patterns) {
            DownloadError::Rejected { profile, message }
        } else {
            DownloadError::Failed { profile, message }
        }
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    #[instrument(skip_all, fields(profile = %profile.name))]
    async fn fetch(
        &self,
        request: &DownloadRequest,
        profile: &ClientProfile,
        progress: &TaskProgress,
    ) -> Result<DownloadedMedia, DownloadError> {
        let args = build_args(&self.settings, request, profile);
        let mut title = None;

        let result = self
            .runner
            .run_streaming(Tool::YtDlp, &args, |line| {
                if let Some(percent) = parse_progress_line(line) {
                    progress.downloading(percent as u8, format!("Downloading... {}%", percent as u8));
                } else if let Some(found) = line.strip_prefix(TITLE_MARKER) {
                    title = Some(found.trim().to_string());
                }
            })
            .await;

        if let Err(error) = result {
            return Err(self.classify(profile, error));
        }

        progress.processing(95, "Processing...");

        let path = request.locate_output().ok_or(DownloadError::OutputMissing)?;
        debug!(path = %path.display(), "Download finished");

        Ok(DownloadedMedia {
            path,
            title: title.unwrap_or_else(|| "download".to_string()),
        })
    }
}

/// Command line for one attempt
pub fn build_args(settings: &YoutubeConfig, request: &DownloadRequest, profile: &ClientProfile) -> Vec<String> {
    let mut args: Vec<String> = [
        "--newline",
        "--progress",
        "--no-warnings",
        "--no-playlist",
        "--print",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect();
    args.push(format!("after_move:{TITLE_MARKER}%(title)s"));

    match request.format {
        MediaFormat::Mp4 => {
            args.extend(["-f".to_string(), settings.format.clone()]);
            args.extend([
                "--merge-output-format".to_string(),
                settings.merge_output_format.clone(),
            ]);
        }
        MediaFormat::Mp3 => {
            args.extend(["-f".to_string(), "bestaudio/best".to_string()]);
            args.extend(["-x".to_string(), "--audio-format".to_string(), "mp3".to_string()]);
        }
    }

    args.extend([
        "--concurrent-fragments".to_string(),
        settings.concurrent_fragments.to_string(),
        "--http-chunk-size".to_string(),
        "10M".to_string(),
        "--retries".to_string(),
        settings.retries.to_string(),
        "--fragment-retries".to_string(),
        settings.fragment_retries.to_string(),
    ]);

    for header in profile.header_flags() {
        args.extend(["--add-header".to_string(), header]);
    }
    for extractor_args in profile.extractor_arg_flags() {
        args.extend(["--extractor-args".to_string(), extractor_args]);
    }

    args.extend([
        "-o".to_string(),
        format!("{}.%(ext)s", request.output_stem.display()),
        "--".to_string(),
        request.url.clone(),
    ]);
    args
}

/// Percentage from a `[download]  42.3% of ...` line
pub fn parse_progress_line(line: &str) -> Option<f32> {
    let captures = PROGRESS_LINE.captures(line.trim_start())?;
    let percent: f32 = captures.get(1)?.as_str().parse().ok()?;
    Some(percent.clamp(0.0, 100.0))
}

/// The `ERROR:` line yt-dlp prints last, if any
fn failure_message(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with("ERROR:"))
        .map(str::to_string)
        .or_else(|| Some(stderr_tail(stderr)).filter(|tail| !tail.is_empty()))
}

pub fn is_rejection_message(message: &str, patterns: &[String]) -> bool {
    let message = message.to_lowercase();
    patterns
        .iter()
        .map(|pattern| pattern.trim().to_lowercase())
        .any(|pattern| !pattern.is_empty() && message.contains(&pattern))
}

/// File-name-safe title: letters, digits, spaces, `-` and `_`, at most 50 chars
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let trimmed: String = kept.trim().chars().take(MAX_TITLE_CHARS).collect();
    let trimmed = trimmed.trim_end().to_string();

    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed
    }
}
