use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "CONVERTBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/convertbox.toml";
const ENV_PREFIX: &str = "CONVERTBOX";
const ENV_SEPARATOR: &str = "__";

/// Path of the TOML file: `CONVERTBOX_CONFIG` or the default location
pub fn config_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration with priority (lowest to highest):
/// 1. Struct defaults
/// 2. TOML file (if present)
/// 3. `.env` file (via dotenvy)
/// 4. Process environment
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is the normal case
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path())?;
    apply_legacy_env(&mut config);

    Ok(config)
}

/// Honour the bare `PORT` and `ENABLE_CORS` variables older deployments set
fn apply_legacy_env(config: &mut Config) {
    if let Ok(port) = env::var("PORT") {
        match port.parse::<u16>() {
            Ok(port) => config.server.bind_addr.set_port(port),
            Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT value"),
        }
    }

    if let Ok(flag) = env::var("ENABLE_CORS") {
        config.server.enable_cors = flag.eq_ignore_ascii_case("true");
    }
}

/// Load configuration from a specific path plus `CONVERTBOX__*` overrides
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // CONVERTBOX__PROGRESS__CLEANUP_DELAY -> progress.cleanup_delay
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.port(), 8000);
        assert_eq!(
            config.progress.poll_interval.as_duration(),
            Duration::from_millis(300)
        );
        assert_eq!(
            config.progress.cleanup_delay.as_duration(),
            Duration::from_secs(5)
        );
        assert_eq!(config.youtube.profiles.len(), 3);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
max_upload_bytes = "64MB"

[progress]
poll_interval = "100ms"
cleanup_delay = "30s"

[tools]
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.max_upload_bytes.as_u64(), 64 * 1024 * 1024);
        assert_eq!(
            config.progress.poll_interval.as_duration(),
            Duration::from_millis(100)
        );
        assert_eq!(
            config.progress.cleanup_delay.as_duration(),
            Duration::from_secs(30)
        );
        assert_eq!(config.tools.ffmpeg, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.tools.yt_dlp, "yt-dlp");
    }

    #[test]
    fn test_load_custom_profiles() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[youtube]
rejection_patterns = ["confirm you're not a bot"]

[[youtube.profiles]]
name = "tv"
http_headers = { "User-Agent" = "Mozilla/5.0 (SMART-TV)" }
extractor_args = { youtube = { player_client = ["tv"] } }
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.youtube.profiles.len(), 1);

        let profile = &config.youtube.profiles[0];
        assert_eq!(profile.name, "tv");
        // Header names are case-insensitive on the wire
        assert!(profile.http_headers.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case("user-agent") && value == "Mozilla/5.0 (SMART-TV)"
        }));
        assert_eq!(
            profile.extractor_args["youtube"]["player_client"],
            vec!["tv".to_string()]
        );
        assert_eq!(config.youtube.rejection_patterns.len(), 1);
    }
}
