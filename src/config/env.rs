use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::domain::StimulusKind;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub proxy: ProxyConfig,
    pub monitor: MonitorConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub remote_base_url: Option<Url>,
    pub generate_path: String,
    pub evaluate_path: String,
    pub pavlok_api_url: Url,
    pub stimulus: StimulusDefaults,
}

#[derive(Debug, Clone, Copy)]
pub struct StimulusDefaults {
    pub kind: StimulusKind,
    pub value: u8,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub proxy_url: Url,
    pub capture: CaptureConfig,
    pub history_limit: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    pub interval: Duration,
    pub jpeg_quality: u8,
    pub readiness_poll: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2_000),
            jpeg_quality: 80,
            readiness_poll: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub token_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl ProxyConfig {
    pub fn remote_base_url(&self) -> Result<&Url, ConfigError> {
        self.remote_base_url
            .as_ref()
            .ok_or(ConfigError::Missing("REMOTE_BASE_URL"))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
