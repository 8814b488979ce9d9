use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thumbcast_core::ImageFormat;

use crate::loader::ConfigLoadError;

pub const ENV_FFMPEG_PATH: &str = "THUMBCAST_FFMPEG_PATH";
/// Fallback shared with other ffmpeg-driving tools.
pub const ENV_FFMPEG_PATH_FALLBACK: &str = "FFMPEG_PATH";
pub const ENV_DRAIN_TIMEOUT_MS: &str = "THUMBCAST_DRAIN_TIMEOUT_MS";
pub const ENV_DEFAULT_FORMAT: &str = "THUMBCAST_DEFAULT_FORMAT";
pub const ENV_DEFAULT_INTERVAL_MS: &str = "THUMBCAST_DEFAULT_INTERVAL_MS";
pub const ENV_CONFIG_PATH: &str = "THUMBCAST_CONFIG";

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub ffmpeg: FileFfmpegConfig,
    #[serde(default)]
    pub execution: FileExecutionConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileFfmpegConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileExecutionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain_timeout_ms: Option<u64>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub drain_timeout_ms: Option<u64>,
    pub default_format: Option<ImageFormat>,
    pub default_interval_ms: Option<u64>,
    pub config_path: Option<PathBuf>,
}

impl EnvConfig {
    /// Build from explicit `(key, value)` pairs; later pairs win.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigLoadError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut env_config = Self::default();
        let mut fallback_ffmpeg_path = None;

        for (key, value) in vars {
            let key = key.as_ref();
            let value: String = value.into();
            if value.trim().is_empty() {
                continue;
            }

            match key {
                ENV_FFMPEG_PATH => env_config.ffmpeg_path = Some(PathBuf::from(value)),
                ENV_FFMPEG_PATH_FALLBACK => fallback_ffmpeg_path = Some(PathBuf::from(value)),
                ENV_DRAIN_TIMEOUT_MS => {
                    env_config.drain_timeout_ms = Some(parse_number(key, &value)?)
                }
                ENV_DEFAULT_INTERVAL_MS => {
                    env_config.default_interval_ms = Some(parse_number(key, &value)?)
                }
                ENV_DEFAULT_FORMAT => {
                    let format = value.parse::<ImageFormat>().map_err(|_| {
                        ConfigLoadError::InvalidEnv {
                            key: key.to_string(),
                            value: value.clone(),
                            expected: "one of jpg, jpeg, png",
                        }
                    })?;
                    env_config.default_format = Some(format);
                }
                ENV_CONFIG_PATH => env_config.config_path = Some(PathBuf::from(value)),
                _ => {}
            }
        }

        if env_config.ffmpeg_path.is_none() {
            env_config.ffmpeg_path = fallback_ffmpeg_path;
        }

        Ok(env_config)
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64, ConfigLoadError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigLoadError::InvalidEnv {
            key: key.to_string(),
            value: value.to_string(),
            expected: "a non-negative integer (milliseconds)",
        })
}
