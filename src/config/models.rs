use crate::download::ClientProfile;
use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub youtube: YoutubeConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Upper bound for a single request body (multipart uploads included)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
    /// Shared scratch directory for uploads and tool outputs
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Optional directory holding the built web client
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    #[serde(default)]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_upload_bytes: default_max_upload_bytes(),
            temp_dir: default_temp_dir(),
            static_dir: None,
            enable_cors: false,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize(512 * 1024 * 1024)
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Progress tracking and task lifecycle timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProgressConfig {
    /// How often a progress stream re-reads the registry when no write wakes it
    #[serde(default = "default_poll_interval")]
    pub poll_interval: HumanDuration,
    /// Grace period between a terminal status and removal of the task entry
    #[serde(default = "default_cleanup_delay")]
    pub cleanup_delay: HumanDuration,
    /// Maximum quiet period on a progress stream before it gives up; `0` waits forever
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout: HumanDuration,
}

impl ProgressConfig {
    pub fn stream_timeout(&self) -> Option<std::time::Duration> {
        let timeout = self.stream_timeout.as_duration();
        (!timeout.is_zero()).then_some(timeout)
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            cleanup_delay: default_cleanup_delay(),
            stream_timeout: default_stream_timeout(),
        }
    }
}

fn default_poll_interval() -> HumanDuration {
    HumanDuration::from_millis(300)
}

fn default_cleanup_delay() -> HumanDuration {
    HumanDuration::from_secs(5)
}

fn default_stream_timeout() -> HumanDuration {
    HumanDuration::from_secs(600)
}

/// Names (or absolute paths) of the external binaries
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_magick")]
    pub magick: String,
    #[serde(default = "default_soffice")]
    pub soffice: String,
    #[serde(default = "default_ebook_convert")]
    pub ebook_convert: String,
    #[serde(default = "default_fontforge")]
    pub fontforge: String,
    #[serde(default = "default_inkscape")]
    pub inkscape: String,
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
    #[serde(default = "default_wkhtmltopdf")]
    pub wkhtmltopdf: String,
    #[serde(default = "default_wkhtmltoimage")]
    pub wkhtmltoimage: String,
    #[serde(default = "default_gs")]
    pub gs: String,
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            magick: default_magick(),
            soffice: default_soffice(),
            ebook_convert: default_ebook_convert(),
            fontforge: default_fontforge(),
            inkscape: default_inkscape(),
            tesseract: default_tesseract(),
            wkhtmltopdf: default_wkhtmltopdf(),
            wkhtmltoimage: default_wkhtmltoimage(),
            gs: default_gs(),
            yt_dlp: default_yt_dlp(),
        }
    }
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_magick() -> String {
    "convert".to_string()
}

fn default_soffice() -> String {
    "soffice".to_string()
}

fn default_ebook_convert() -> String {
    "ebook-convert".to_string()
}

fn default_fontforge() -> String {
    "fontforge".to_string()
}

fn default_inkscape() -> String {
    "inkscape".to_string()
}

fn default_tesseract() -> String {
    "tesseract".to_string()
}

fn default_wkhtmltopdf() -> String {
    "wkhtmltopdf".to_string()
}

fn default_wkhtmltoimage() -> String {
    "wkhtmltoimage".to_string()
}

fn default_gs() -> String {
    "gs".to_string()
}

fn default_yt_dlp() -> String {
    "yt-dlp".to_string()
}

/// Remote video download settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YoutubeConfig {
    #[serde(default = "default_video_format")]
    pub format: String,
    #[serde(default = "default_merge_output_format")]
    pub merge_output_format: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,
    #[serde(default = "default_concurrent_fragments")]
    pub concurrent_fragments: u32,
    /// Lowercase phrases that mark an upstream refusal based on client identity
    #[serde(default = "default_rejection_patterns")]
    pub rejection_patterns: Vec<String>,
    /// Client identities in priority order; the first one is tried first
    #[serde(default = "ClientProfile::defaults")]
    pub profiles: Vec<ClientProfile>,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            format: default_video_format(),
            merge_output_format: default_merge_output_format(),
            retries: default_retries(),
            fragment_retries: default_retries(),
            concurrent_fragments: default_concurrent_fragments(),
            rejection_patterns: default_rejection_patterns(),
            profiles: ClientProfile::defaults(),
        }
    }
}

fn default_video_format() -> String {
    "bestvideo[height<=1080][ext=mp4]+bestaudio[ext=m4a]/best[height<=1080][ext=mp4]/best"
        .to_string()
}

fn default_merge_output_format() -> String {
    "mp4".to_string()
}

fn default_retries() -> u32 {
    10
}

fn default_concurrent_fragments() -> u32 {
    8
}

fn default_rejection_patterns() -> Vec<String> {
    vec![
        "sign in to confirm you".to_string(),
        "please sign in".to_string(),
    ]
}
