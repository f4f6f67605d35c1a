//! External conversion binaries
//!
//! Every conversion is delegated to a command-line tool. [`ToolRunner`]
//! resolves the configured binary for a [`Tool`], runs it without a shell
//! and turns a non-zero exit into a [`ToolError`] carrying the tail of its
//! stderr.

pub mod archive;
pub mod convert;

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::ToolsConfig;

/// Lines of stderr kept in a failure message
const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    ImageMagick,
    LibreOffice,
    EbookConvert,
    FontForge,
    Inkscape,
    Tesseract,
    Wkhtmltopdf,
    Wkhtmltoimage,
    Ghostscript,
    YtDlp,
}

impl Tool {
    pub const ALL: [Tool; 11] = [
        Tool::Ffmpeg,
        Tool::ImageMagick,
        Tool::LibreOffice,
        Tool::EbookConvert,
        Tool::FontForge,
        Tool::Inkscape,
        Tool::Tesseract,
        Tool::Wkhtmltopdf,
        Tool::Wkhtmltoimage,
        Tool::Ghostscript,
        Tool::YtDlp,
    ];

    /// Key of the tool in the `[tools]` config section
    pub fn config_key(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::ImageMagick => "magick",
            Tool::LibreOffice => "soffice",
            Tool::EbookConvert => "ebook_convert",
            Tool::FontForge => "fontforge",
            Tool::Inkscape => "inkscape",
            Tool::Tesseract => "tesseract",
            Tool::Wkhtmltopdf => "wkhtmltopdf",
            Tool::Wkhtmltoimage => "wkhtmltoimage",
            Tool::Ghostscript => "gs",
            Tool::YtDlp => "yt_dlp",
        }
    }

    pub fn binary(self, config: &ToolsConfig) -> &str {
        match self {
            Tool::Ffmpeg => &config.ffmpeg,
            Tool::ImageMagick => &config.magick,
            Tool::LibreOffice => &config.soffice,
            Tool::EbookConvert => &config.ebook_convert,
            Tool::FontForge => &config.fontforge,
            Tool::Inkscape => &config.inkscape,
            Tool::Tesseract => &config.tesseract,
            Tool::Wkhtmltopdf => &config.wkhtmltopdf,
            Tool::Wkhtmltoimage => &config.wkhtmltoimage,
            Tool::Ghostscript => &config.gs,
            Tool::YtDlp => &config.yt_dlp,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{program} not found, install it or set its path in the [tools] config section")]
    NotFound { program: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exit {}{}", exit_label(.code), stderr_suffix(.stderr))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} finished without creating {}", .path.display())]
    MissingOutput { program: String, path: PathBuf },

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "by signal".to_string(), |code| code.to_string())
}

fn stderr_suffix(stderr: &str) -> String {
    let tail = stderr_tail(stderr);
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {tail}")
    }
}

/// Last few non-empty lines of a tool's stderr, joined with spaces
pub fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" ")
}

/// Where a configured tool resolved to, as reported by `check-tools`
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub tool: Tool,
    pub binary: String,
    pub resolved: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ToolRunner {
    config: Arc<ToolsConfig>,
}

impl ToolRunner {
    pub fn new(config: ToolsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn binary(&self, tool: Tool) -> &str {
        tool.binary(&self.config)
    }

    /// Resolve the binary on PATH (or as given, when it is a path)
    pub fn locate(&self, tool: Tool) -> Result<PathBuf, ToolError> {
        let binary = self.binary(tool);
        which::which(binary).map_err(|_| ToolError::NotFound {
            program: binary.to_string(),
        })
    }

    pub fn availability(&self) -> Vec<ToolStatus> {
        Tool::ALL
            .iter()
            .map(|&tool| ToolStatus {
                tool,
                binary: self.binary(tool).to_string(),
                resolved: self.locate(tool).ok(),
            })
            .collect()
    }

    fn command<I, S>(&self, tool: Tool, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(self.binary(tool));
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, tool: Tool, source: io::Error) -> ToolError {
        let program = self.binary(tool).to_string();
        if source.kind() == io::ErrorKind::NotFound {
            ToolError::NotFound { program }
        } else {
            ToolError::Spawn { program, source }
        }
    }

    /// Run the tool to completion, capturing its output
    #[instrument(skip(self, args))]
    pub async fn run<I, S>(&self, tool: Tool, args: I) -> Result<Output, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self
            .command(tool, args)
            .output()
            .await
            .map_err(|source| self.spawn_error(tool, source))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            debug!(code = ?output.status.code(), "Tool exited with failure");
            return Err(ToolError::Failed {
                program: self.binary(tool).to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(output)
    }

    /// Run the tool, handing each stdout line to `on_line` as it arrives.
    /// Returns the collected stderr on success.
    #[instrument(skip(self, args, on_line))]
    pub async fn run_streaming<I, S, F>(
        &self,
        tool: Tool,
        args: I,
        mut on_line: F,
    ) -> Result<String, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
        F: FnMut(&str) + Send,
    {
        let mut child = self
            .command(tool, args)
            .spawn()
            .map_err(|source| self.spawn_error(tool, source))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let read_stdout = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    on_line(&line);
                }
            }
            Ok::<_, io::Error>(())
        };
        let read_stderr = async {
            let mut collected = String::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_string(&mut collected).await?;
            }
            Ok::<_, io::Error>(collected)
        };

        let (stdout_result, stderr_result) = tokio::join!(read_stdout, read_stderr);
        stdout_result?;
        let stderr = stderr_result?;
        let status = child.wait().await?;

        if !status.success() {
            debug!(code = ?status.code(), "Tool exited with failure");
            return Err(ToolError::Failed {
                program: self.binary(tool).to_string(),
                code: status.code(),
                stderr,
            });
        }

        Ok(stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner_with(tool_binary: &str) -> ToolRunner {
        let config = ToolsConfig {
            ffmpeg: tool_binary.to_string(),
            ..ToolsConfig::default()
        };
        ToolRunner::new(config)
    }

    #[test]
    fn test_failure_message_includes_exit_code_and_stderr_tail() {
        let error = ToolError::Failed {
            program: "ffmpeg".to_string(),
            code: Some(1),
            stderr: "line one\n\nInvalid data found when processing input\n".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "ffmpeg exit 1: line one Invalid data found when processing input"
        );

        let bare = ToolError::Failed {
            program: "ffmpeg".to_string(),
            code: Some(1),
            stderr: String::new(),
        };
        assert_eq!(bare.to_string(), "ffmpeg exit 1");
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = (1..=8).map(|n| format!("l{n}")).collect::<Vec<_>>().join("\n");
        assert_eq!(stderr_tail(&stderr), "l4 l5 l6 l7 l8");
    }

    #[test]
    fn test_every_tool_has_a_binary() {
        let config = ToolsConfig::default();
        for tool in Tool::ALL {
            assert!(!tool.binary(&config).is_empty(), "{tool}");
        }
        assert_eq!(Tool::ImageMagick.binary(&config), "convert");
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let runner = runner_with("convertbox-no-such-binary");
        let result = runner.run(Tool::Ffmpeg, ["-version"]).await;
        assert!(matches!(result, Err(ToolError::NotFound { .. })));
        assert!(runner.locate(Tool::Ffmpeg).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_failed() {
        let runner = runner_with("sh");
        let result = runner
            .run(Tool::Ffmpeg, ["-c", "echo 'bad input' >&2; exit 3"])
            .await;

        match result {
            Err(ToolError::Failed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "bad input");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streaming_delivers_lines_in_order() {
        let runner = runner_with("sh");
        let mut lines = Vec::new();

        let stderr = runner
            .run_streaming(
                Tool::Ffmpeg,
                ["-c", "echo one; echo two; echo warn >&2"],
                |line| lines.push(line.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(stderr.trim(), "warn");
    }
}
