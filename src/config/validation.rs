use super::models::Config;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("progress.{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("server.max_upload_bytes must be greater than zero")]
    ZeroUploadLimit,

    #[error("tools.{tool} must name a binary")]
    EmptyToolBinary { tool: &'static str },

    #[error("youtube.profiles must contain at least one client profile")]
    NoClientProfiles,

    #[error("client profile name '{0}' is used more than once")]
    DuplicateProfileName(String),

    #[error("client profile #{index} has an empty name")]
    UnnamedProfile { index: usize },

    #[error("youtube.rejection_patterns must contain at least one non-empty phrase")]
    NoRejectionPatterns,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_progress(config)?;
    validate_tools(config)?;
    validate_youtube(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.max_upload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroUploadLimit);
    }
    Ok(())
}

fn validate_progress(config: &Config) -> Result<(), ValidationError> {
    let progress = &config.progress;

    if progress.poll_interval.as_duration().is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "poll_interval",
        });
    }

    if progress.cleanup_delay.as_duration().is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "cleanup_delay",
        });
    }

    Ok(())
}

fn validate_tools(config: &Config) -> Result<(), ValidationError> {
    let tools = &config.tools;
    let binaries = [
        ("ffmpeg", &tools.ffmpeg),
        ("magick", &tools.magick),
        ("soffice", &tools.soffice),
        ("ebook_convert", &tools.ebook_convert),
        ("fontforge", &tools.fontforge),
        ("inkscape", &tools.inkscape),
        ("tesseract", &tools.tesseract),
        ("wkhtmltopdf", &tools.wkhtmltopdf),
        ("wkhtmltoimage", &tools.wkhtmltoimage),
        ("gs", &tools.gs),
        ("yt_dlp", &tools.yt_dlp),
    ];

    for (tool, binary) in binaries {
        if binary.trim().is_empty() {
            return Err(ValidationError::EmptyToolBinary { tool });
        }
    }

    Ok(())
}

fn validate_youtube(config: &Config) -> Result<(), ValidationError> {
    let youtube = &config.youtube;

    if youtube.profiles.is_empty() {
        return Err(ValidationError::NoClientProfiles);
    }

    let mut seen = HashSet::new();
    for (index, profile) in youtube.profiles.iter().enumerate() {
        if profile.name.trim().is_empty() {
            return Err(ValidationError::UnnamedProfile { index });
        }
        if !seen.insert(profile.name.as_str()) {
            return Err(ValidationError::DuplicateProfileName(profile.name.clone()));
        }
    }

    if !youtube
        .rejection_patterns
        .iter()
        .any(|pattern| !pattern.trim().is_empty())
    {
        return Err(ValidationError::NoRejectionPatterns);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::{ByteSize, HumanDuration};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_poll_interval() {
        let mut config = Config::default();
        config.progress.poll_interval = HumanDuration::from_millis(0);

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::ZeroDuration {
                field: "poll_interval"
            })
        ));
    }

    #[test]
    fn test_zero_stream_timeout_disables_it() {
        let mut config = Config::default();
        config.progress.stream_timeout = HumanDuration::from_millis(0);

        assert!(validate(&config).is_ok());
        assert_eq!(config.progress.stream_timeout(), None);
    }

    #[test]
    fn test_zero_upload_limit() {
        let mut config = Config::default();
        config.server.max_upload_bytes = ByteSize(0);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroUploadLimit)
        ));
    }

    #[test]
    fn test_empty_tool_binary() {
        let mut config = Config::default();
        config.tools.ffmpeg = "  ".to_string();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptyToolBinary { tool: "ffmpeg" })
        ));
    }

    #[test]
    fn test_no_profiles() {
        let mut config = Config::default();
        config.youtube.profiles.clear();

        assert!(matches!(
            validate(&config),
            Err(ValidationError::NoClientProfiles)
        ));
    }

    #[test]
    fn test_duplicate_profile_names() {
        let mut config = Config::default();
        let first = config.youtube.profiles[0].clone();
        config.youtube.profiles.push(first);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateProfileName(_))
        ));
    }

    #[test]
    fn test_blank_rejection_patterns() {
        let mut config = Config::default();
        config.youtube.rejection_patterns = vec![String::new()];

        assert!(matches!(
            validate(&config),
            Err(ValidationError::NoRejectionPatterns)
        ));
    }
}
