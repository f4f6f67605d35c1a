//! Request parameter checks
//!
//! Everything here runs before a conversion starts, so a rejected request
//! never writes a progress record.

use crate::api::error::ApiError;
use crate::tools::convert::Dimensions;

const MAX_FORMAT_LEN: usize = 10;

/// Lowercase output format token, `default` when the field is absent
///
/// The token ends up as a file extension and a tool argument, so only
/// short ASCII alphanumerics pass.
pub fn output_format(value: Option<&str>, default: &str) -> Result<String, ApiError> {
    let format = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_ascii_lowercase();

    if format.is_empty()
        || format.len() > MAX_FORMAT_LEN
        || !format.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ApiError::InvalidInput(format!("invalid output format '{format}'")));
    }

    Ok(format)
}

/// Absolute http(s) URL with a host part
pub fn http_url(value: Option<&str>) -> Result<String, ApiError> {
    let url = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("URL is required".to_string()))?;

    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| ApiError::InvalidInput("URL must start with http:// or https://".to_string()))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ApiError::InvalidInput(format!("invalid URL '{url}'")));
    }

    Ok(url.to_string())
}

fn positive(name: &str, value: &str) -> Result<u32, ApiError> {
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ApiError::InvalidInput(format!(
            "{name} must be a positive integer, got '{value}'"
        ))),
    }
}

/// Both `width` and `height`, or neither
pub fn dimensions(width: Option<&str>, height: Option<&str>) -> Result<Option<Dimensions>, ApiError> {
    match (width, height) {
        (Some(width), Some(height)) => Ok(Some(Dimensions {
            width: positive("width", width)?,
            height: positive("height", height)?,
        })),
        (None, None) => Ok(None),
        _ => Err(ApiError::InvalidInput(
            "width and height must be given together".to_string(),
        )),
    }
}

pub fn quality(value: Option<&str>) -> Result<u8, ApiError> {
    let Some(value) = value else {
        return Ok(95);
    };
    match value.trim().parse::<u8>() {
        Ok(quality) if (1..=100).contains(&quality) => Ok(quality),
        _ => Err(ApiError::InvalidInput(format!(
            "quality must be between 1 and 100, got '{value}'"
        ))),
    }
}

pub fn fps(value: Option<&str>) -> Result<u32, ApiError> {
    match value {
        None => Ok(12),
        Some(value) => {
            let fps = positive("fps", value)?;
            if fps > 60 {
                return Err(ApiError::InvalidInput("fps must be at most 60".to_string()));
            }
            Ok(fps)
        }
    }
}

/// Rasterisation density for PDF pages, 200 by default
pub fn dpi(value: Option<&str>) -> Result<u32, ApiError> {
    match value {
        None => Ok(200),
        Some(value) => {
            let dpi = positive("dpi", value)?;
            if dpi > 600 {
                return Err(ApiError::InvalidInput("dpi must be at most 600".to_string()));
            }
            Ok(dpi)
        }
    }
}

/// ffmpeg bitrate such as `192k`
pub fn bitrate(value: Option<&str>) -> Result<String, ApiError> {
    let bitrate = value.map(str::trim).unwrap_or("192k").to_ascii_lowercase();
    let digits = bitrate.strip_suffix('k').unwrap_or(&bitrate);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::InvalidInput(format!("invalid bitrate '{bitrate}'")));
    }
    Ok(bitrate)
}

/// Tesseract language codes, `eng` or `eng+deu`
pub fn ocr_language(value: Option<&str>) -> Result<String, ApiError> {
    let lang = value.map(str::trim).unwrap_or("eng");
    let valid = !lang.is_empty()
        && lang
            .split('+')
            .all(|code| !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));

    if valid {
        Ok(lang.to_string())
    } else {
        Err(ApiError::InvalidInput(format!("invalid OCR language '{lang}'")))
    }
}
