use std::{env, time::Duration};

use url::Url;

use super::env::{
    AppConfig, CaptureConfig, ConfigError, DirectoryConfig, LoggingConfig, MonitorConfig,
    ProxyConfig, StimulusDefaults,
};
use crate::{domain::StimulusKind, proxy::PAVLOK_STIMULUS_URL};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let remote_base_url = match non_empty("REMOTE_BASE_URL") {
            Some(raw) => Some(parse_url("REMOTE_BASE_URL", &raw)?),
            None => None,
        };

        let stimulus = StimulusDefaults {
            kind: match non_empty("STIMULUS_TYPE") {
                Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                    key: "STIMULUS_TYPE",
                    reason,
                })?,
                None => StimulusKind::Vibrate,
            },
            value: parse_num::<u8>("STIMULUS_VALUE")?.unwrap_or(100),
        };
        if !(1..=100).contains(&stimulus.value) {
            return Err(ConfigError::Invalid {
                key: "STIMULUS_VALUE",
                reason: format!("{} is outside 1..=100", stimulus.value),
            });
        }

        let proxy = ProxyConfig {
            port: parse_num::<u16>("PORT")?.unwrap_or(8000),
            remote_base_url,
            generate_path: env::var("REMOTE_GENERATE_PATH")
                .unwrap_or_else(|_| "/generate_config".to_string()),
            evaluate_path: env::var("REMOTE_EVALUATE_PATH")
                .unwrap_or_else(|_| "/evaluate-capture-for-trigger".to_string()),
            pavlok_api_url: parse_url(
                "PAVLOK_API_URL",
                &non_empty("PAVLOK_API_URL").unwrap_or_else(|| PAVLOK_STIMULUS_URL.to_string()),
            )?,
            stimulus,
        };

        let defaults = CaptureConfig::default();
        let capture = CaptureConfig {
            interval: parse_num::<u64>("CAPTURE_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            jpeg_quality: parse_num::<u8>("CAPTURE_JPEG_QUALITY")?
                .map(|q| q.clamp(1, 100))
                .unwrap_or(defaults.jpeg_quality),
            readiness_poll: defaults.readiness_poll,
        };
        if capture.interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "CAPTURE_INTERVAL_MS",
                reason: "interval must be greater than zero".to_string(),
            });
        }

        let monitor = MonitorConfig {
            proxy_url: parse_url(
                "PROXY_URL",
                &non_empty("PROXY_URL").unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
            )?,
            capture,
            history_limit: parse_num::<usize>("CAPTURE_HISTORY_LIMIT")?.unwrap_or(10),
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            token_filename: env::var("TOKEN_FILENAME")
                .unwrap_or_else(|_| "pavlok_token".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(Self {
            proxy,
            monitor,
            directories,
            logging,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_num<T: std::str::FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match non_empty(key) {
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| ConfigError::Invalid {
            key,
            reason: format!("`{raw}` is not a valid number"),
        }),
        None => Ok(None),
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    Ok(url)
}
