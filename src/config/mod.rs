//! Configuration management for ConvertBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use convertbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `CONVERTBOX__<section>__<key>`
//!
//! Examples:
//! - `CONVERTBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `CONVERTBOX__PROGRESS__CLEANUP_DELAY=10s`
//! - `CONVERTBOX__TOOLS__FFMPEG=/usr/local/bin/ffmpeg`
//!
//! `PORT` and `ENABLE_CORS` are also honoured for compatibility with
//! existing deployments.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/convertbox.toml`.
//! This can be overridden using the `CONVERTBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{Config, ProgressConfig, ServerConfig, ToolsConfig, YoutubeConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a
    /// validation rule fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Default location of the configuration file, after `CONVERTBOX_CONFIG`
    pub fn default_path() -> std::path::PathBuf {
        sources::config_path()
    }
}
