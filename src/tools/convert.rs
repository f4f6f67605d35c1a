//! One function per conversion kind
//!
//! Callers own the paths: inputs are already on disk and outputs are
//! written where asked. Nothing here deletes files it did not create.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{Tool, ToolError, ToolRunner};

/// Output formats ImageMagick is asked to write
pub const IMAGE_OUTPUT_FORMATS: &[&str] = &[
    "avif", "bmp", "eps", "gif", "heic", "heif", "icns", "ico", "jfif", "jpeg", "msp", "pcx", "pdf",
    "png", "ppm", "ps", "psd", "sgi", "tga", "tiff", "webp", "xbm", "xcf", "xps",
];

const LOSSY_IMAGE_FORMATS: &[&str] = &["jpeg", "jfif", "webp", "avif", "heic", "heif"];

const INKSCAPE_FORMATS: &[&str] = &["svg", "pdf", "eps", "ps", "png"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Canonical image format name, or `UnsupportedFormat`
pub fn normalize_image_format(format: &str) -> Result<String, ToolError> {
    let format = match format.to_ascii_lowercase().as_str() {
        "jpg" => "jpeg".to_string(),
        "tif" => "tiff".to_string(),
        other => other.to_string(),
    };

    if IMAGE_OUTPUT_FORMATS.contains(&format.as_str()) {
        Ok(format)
    } else {
        Err(ToolError::UnsupportedFormat(format!(
            "cannot convert to {}, supported image outputs: {}",
            format.to_uppercase(),
            IMAGE_OUTPUT_FORMATS.join(", ")
        )))
    }
}

fn ensure_output(runner: &ToolRunner, tool: Tool, output: &Path) -> Result<(), ToolError> {
    if output.is_file() {
        Ok(())
    } else {
        Err(ToolError::MissingOutput {
            program: runner.binary(tool).to_string(),
            path: output.to_path_buf(),
        })
    }
}

pub async fn convert_image(
    runner: &ToolRunner,
    input: &Path,
    output: &Path,
    format: &str,
    resize: Option<Dimensions>,
    quality: u8,
) -> Result<(), ToolError> {
    let format = normalize_image_format(format)?;

    let mut args = vec![input.as_os_str().to_owned()];
    if let Some(Dimensions { width, height }) = resize {
        args.push("-resize".into());
        args.push(format!("{width}x{height}").into());
    }
    if LOSSY_IMAGE_FORMATS.contains(&format.as_str()) {
        args.push("-quality".into());
        args.push(quality.min(100).to_string().into());
    }
    // The explicit prefix keeps ImageMagick from guessing the format from the name
    args.push(format!("{format}:{}", output.display()).into());

    runner.run(Tool::ImageMagick, &args).await?;
    ensure_output(runner, Tool::ImageMagick, output)
}

pub async fn convert_audio(
    runner: &ToolRunner,
    input: &Path,
    output: &Path,
    bitrate: &str,
) -> Result<(), ToolError> {
    let args = [
        OsStr::new("-y"),
        OsStr::new("-i"),
        input.as_os_str(),
        OsStr::new("-vn"),
        OsStr::new("-ab"),
        OsStr::new(bitrate),
        output.as_os_str(),
    ];
    runner.run(Tool::Ffmpeg, args).await?;
    ensure_output(runner, Tool::Ffmpeg, output)
}

pub async fn convert_video(runner: &ToolRunner, input: &Path, output: &Path) -> Result<(), ToolError> {
    let args = [OsStr::new("-y"), OsStr::new("-i"), input.as_os_str(), output.as_os_str()];
    runner.run(Tool::Ffmpeg, args).await?;
    ensure_output(runner, Tool::Ffmpeg, output)
}

/// Build the ffmpeg filter chain used for GIF output
pub fn gif_filter(fps: u32, scale: Option<Dimensions>) -> String {
    match scale {
        Some(Dimensions { width, height }) => {
            format!("fps={fps},scale={width}:{height}:flags=lanczos")
        }
        None => format!("fps={fps}"),
    }
}

pub async fn video_to_gif(
    runner: &ToolRunner,
    input: &Path,
    output: &Path,
    fps: u32,
    scale: Option<Dimensions>,
) -> Result<(), ToolError> {
    let filter = gif_filter(fps, scale);
    let args = [
        OsStr::new("-y"),
        OsStr::new("-i"),
        input.as_os_str(),
        OsStr::new("-vf"),
        OsStr::new(&filter),
        OsStr::new("-loop"),
        OsStr::new("0"),
        output.as_os_str(),
    ];
    runner.run(Tool::Ffmpeg, args).await?;
    ensure_output(runner, Tool::Ffmpeg, output)
}

/// LibreOffice filter name for formats that need one
pub fn office_target(format: &str) -> String {
    match format.to_ascii_lowercase().as_str() {
        "txt" => "txt:Text".to_string(),
        "html" => "html:XHTML Writer File".to_string(),
        other => other.to_string(),
    }
}

/// Convert with LibreOffice into `out_dir`, returning the produced file.
///
/// LibreOffice picks the output name itself, so the file is located
/// afterwards: an exact stem match wins, then a prefix match, then any new
/// file.
pub async fn convert_office(
    runner: &ToolRunner,
    input: &Path,
    out_dir: &Path,
    format: &str,
) -> Result<PathBuf, ToolError> {
    tokio::fs::create_dir_all(out_dir).await?;
    let before = list_files(out_dir).await?;

    let target = office_target(format);
    let args = [
        OsStr::new("--headless"),
        OsStr::new("--convert-to"),
        OsStr::new(&target),
        OsStr::new("--outdir"),
        out_dir.as_os_str(),
        input.as_os_str(),
    ];
    runner.run(Tool::LibreOffice, args).await?;

    let created: Vec<PathBuf> = list_files(out_dir)
        .await?
        .into_iter()
        .filter(|path| !before.contains(path))
        .collect();

    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    pick_office_output(&created, &stem).ok_or_else(|| ToolError::MissingOutput {
        program: runner.binary(Tool::LibreOffice).to_string(),
        path: out_dir.join(format!("{stem}.{format}")),
    })
}

fn pick_office_output(created: &[PathBuf], stem: &str) -> Option<PathBuf> {
    fn stem_of(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    created
        .iter()
        .find(|path| stem_of(path) == stem)
        .or_else(|| created.iter().find(|path| stem_of(path).starts_with(stem)))
        .or_else(|| created.first())
        .cloned()
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ToolError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub async fn convert_ebook(runner: &ToolRunner, input: &Path, output: &Path) -> Result<(), ToolError> {
    runner.run(Tool::EbookConvert, [input, output]).await?;
    ensure_output(runner, Tool::EbookConvert, output)
}

/// Inkscape for the formats it exports, ImageMagick for the rest or when
/// Inkscape is missing or fails
pub async fn convert_vector(
    runner: &ToolRunner,
    input: &Path,
    output: &Path,
    format: &str,
) -> Result<(), ToolError> {
    let format = format.to_ascii_lowercase();

    if INKSCAPE_FORMATS.contains(&format.as_str()) && runner.locate(Tool::Inkscape).is_ok() {
        let export = format!("--export-filename={}", output.display());
        match runner.run(Tool::Inkscape, [input.as_os_str(), OsStr::new(&export)]).await {
            Ok(_) if output.is_file() => return Ok(()),
            Ok(_) => warn!("Inkscape produced no output, falling back to ImageMagick"),
            Err(error) => warn!(%error, "Inkscape failed, falling back to ImageMagick"),
        }
    }

    runner.run(Tool::ImageMagick, [input, output]).await?;
    ensure_output(runner, Tool::ImageMagick, output)
}

/// FontForge script that re-generates `input` as `output`
pub fn fontforge_script(input: &Path, output: &Path) -> String {
    let quote = |path: &Path| path.display().to_string().replace('\\', "\\\\").replace('"', "\\\"");
    format!("Open(\"{}\");\nGenerate(\"{}\");\n", quote(input), quote(output))
}

pub async fn convert_font(runner: &ToolRunner, input: &Path, output: &Path) -> Result<(), ToolError> {
    let mut script_path = input.as_os_str().to_owned();
    script_path.push(".ff_script");
    let script_path = PathBuf::from(script_path);

    tokio::fs::write(&script_path, fontforge_script(input, output)).await?;
    let result = runner
        .run(Tool::FontForge, [OsStr::new("-script"), script_path.as_os_str()])
        .await;

    if let Err(error) = tokio::fs::remove_file(&script_path).await {
        debug!(%error, path = %script_path.display(), "Failed to remove FontForge script");
    }

    result?;
    ensure_output(runner, Tool::FontForge, output)
}

/// Recognised text of an image; tesseract writes it to stdout
pub async fn image_to_text(runner: &ToolRunner, input: &Path, lang: &str) -> Result<String, ToolError> {
    let args = [input.as_os_str(), OsStr::new("stdout"), OsStr::new("-l"), OsStr::new(lang)];
    let output = runner.run(Tool::Tesseract, args).await?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub async fn capture_pdf(runner: &ToolRunner, url: &str, output: &Path) -> Result<(), ToolError> {
    runner
        .run(Tool::Wkhtmltopdf, [OsStr::new(url), output.as_os_str()])
        .await?;
    ensure_output(runner, Tool::Wkhtmltopdf, output)
}

pub async fn capture_image(
    runner: &ToolRunner,
    url: &str,
    output: &Path,
    format: &str,
) -> Result<(), ToolError> {
    let args = [
        OsStr::new("--format"),
        OsStr::new(format),
        OsStr::new(url),
        output.as_os_str(),
    ];
    runner.run(Tool::Wkhtmltoimage, args).await?;
    ensure_output(runner, Tool::Wkhtmltoimage, output)
}

/// Size reduction presets, named after their route segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimization {
    Png,
    Jpg,
    Jpeg,
    Pdf,
}

impl Optimization {
    pub fn parse(tool: &str) -> Result<Self, ToolError> {
        match tool.to_ascii_lowercase().as_str() {
            "compress-png" => Ok(Optimization::Png),
            "compress-jpg" => Ok(Optimization::Jpg),
            "compress-jpeg" => Ok(Optimization::Jpeg),
            "compress-pdf" => Ok(Optimization::Pdf),
            other => Err(ToolError::UnsupportedFormat(format!(
                "unknown optimization '{other}', expected compress-png, compress-jpg or compress-pdf"
            ))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Optimization::Png => "png",
            Optimization::Jpg => "jpg",
            Optimization::Jpeg => "jpeg",
            Optimization::Pdf => "pdf",
        }
    }
}

/// Re-encode `input` smaller: lossless PNG at maximum compression, JPEG at
/// quality 85, PDF through Ghostscript's ebook preset
pub async fn optimize(
    runner: &ToolRunner,
    optimization: Optimization,
    input: &Path,
    output: &Path,
) -> Result<(), ToolError> {
    let tool = match optimization {
        Optimization::Png => {
            let args = [
                input.as_os_str(),
                OsStr::new("-strip"),
                OsStr::new("-define"),
                OsStr::new("png:compression-level=9"),
                output.as_os_str(),
            ];
            runner.run(Tool::ImageMagick, args).await?;
            Tool::ImageMagick
        }
        Optimization::Jpg | Optimization::Jpeg => {
            let args = [
                input.as_os_str(),
                OsStr::new("-strip"),
                OsStr::new("-quality"),
                OsStr::new("85"),
                output.as_os_str(),
            ];
            runner.run(Tool::ImageMagick, args).await?;
            Tool::ImageMagick
        }
        Optimization::Pdf => {
            let target = format!("-sOutputFile={}", output.display());
            let args = [
                OsStr::new("-sDEVICE=pdfwrite"),
                OsStr::new("-dCompatibilityLevel=1.4"),
                OsStr::new("-dPDFSETTINGS=/ebook"),
                OsStr::new("-dNOPAUSE"),
                OsStr::new("-dQUIET"),
                OsStr::new("-dBATCH"),
                OsStr::new(&target),
                input.as_os_str(),
            ];
            runner.run(Tool::Ghostscript, args).await?;
            Tool::Ghostscript
        }
    };
    ensure_output(runner, tool, output)
}

/// One PDF page per input image, in upload order
pub async fn images_to_pdf(runner: &ToolRunner, inputs: &[PathBuf], output: &Path) -> Result<(), ToolError> {
    let mut args: Vec<&OsStr> = inputs.iter().map(|path| path.as_os_str()).collect();
    args.push(output.as_os_str());
    runner.run(Tool::ImageMagick, args).await?;
    ensure_output(runner, Tool::ImageMagick, output)
}

/// Rasterise every page of `input` into `out_dir` as
/// `{stem}_page{N}.{format}`, returning the pages in order
pub async fn pdf_to_images(
    runner: &ToolRunner,
    input: &Path,
    out_dir: &Path,
    dpi: u32,
    format: &str,
) -> Result<Vec<PathBuf>, ToolError> {
    tokio::fs::create_dir_all(out_dir).await?;

    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    let pattern = out_dir.join(format!("{stem}_page%d.{format}"));
    let density = dpi.to_string();
    let args = [
        OsStr::new("-density"),
        OsStr::new(&density),
        input.as_os_str(),
        OsStr::new("-background"),
        OsStr::new("white"),
        OsStr::new("-alpha"),
        OsStr::new("remove"),
        OsStr::new("-scene"),
        OsStr::new("1"),
        pattern.as_os_str(),
    ];
    runner.run(Tool::ImageMagick, args).await?;

    let mut pages = list_files(out_dir).await?;
    pages.sort_by_key(|path| page_number(path));
    if pages.is_empty() {
        return Err(ToolError::MissingOutput {
            program: runner.binary(Tool::ImageMagick).to_string(),
            path: pattern,
        });
    }
    Ok(pages)
}

fn page_number(path: &Path) -> u32 {
    path.file_stem()
        .map(|stem| stem.to_string_lossy())
        .and_then(|stem| {
            stem.rsplit_once("_page")
                .and_then(|(_, number)| number.parse().ok())
        })
        .unwrap_or(u32::MAX)
}

/// Recognised text of every page, pages separated by a blank line
pub async fn pdf_to_text(
    runner: &ToolRunner,
    input: &Path,
    work_dir: &Path,
    lang: &str,
) -> Result<String, ToolError> {
    let pages = pdf_to_images(runner, input, work_dir, 200, "png").await?;

    let mut texts = Vec::with_capacity(pages.len());
    for page in &pages {
        texts.push(image_to_text(runner, page, lang).await?);
    }
    Ok(texts.join("\n\n"))
}
