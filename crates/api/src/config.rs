//! Application configuration: optional TOML file layered under DROWSY_* env vars

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alerting::AlertConfig;
use camera_capture::CaptureConfig;
use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment, File};
use dms::DmsConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use video_stream::StreamConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Time given to worker loops to observe the stop flag (milliseconds)
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            shutdown_grace_ms: 500,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Classifier model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX eye-state model; without it no face is ever reported
    pub path: Option<PathBuf>,
    /// Square model input edge (pixels)
    pub input_size: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            input_size: 224,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CaptureConfig,
    pub detection: DmsConfig,
    pub stream: StreamConfig,
    pub alerts: AlertConfig,
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from an optional TOML file, then `DROWSY_*` environment variables
    ///
    /// Nested keys use `__`, e.g. `DROWSY_DETECTION__DROWSY_DURATION_SECS=2.0`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("DROWSY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("camera.candidates")
                .try_parsing(true),
        );
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.camera.candidates.is_empty() {
            return invalid("camera.candidates must not be empty".into());
        }
        if self.camera.fps == 0 {
            return invalid("camera.fps must be at least 1".into());
        }
        self.detection
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("detection: {}", e)))?;
        if self.stream.max_fps == 0 {
            return invalid("stream.max_fps must be at least 1".into());
        }
        if self.stream.width == 0 || self.stream.height == 0 {
            return invalid("stream.width and stream.height must be non-zero".into());
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return invalid(format!(
                "stream.jpeg_quality must be within 1..100, got {}",
                self.stream.jpeg_quality
            ));
        }
        if self.model.input_size == 0 {
            return invalid("model.input_size must be at least 1".into());
        }
        if SocketAddr::from_str(&self.server.bind).is_err() {
            return invalid(format!("server.bind is not a socket address: {}", self.server.bind));
        }
        if tracing::Level::from_str(&self.logging.level).is_err() {
            return invalid(format!("logging.level is not a level: {}", self.logging.level));
        }
        Ok(())
    }
}
