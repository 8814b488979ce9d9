use std::path::PathBuf;
use std::time::Duration;

use thumbcast_core::{DEFAULT_FFMPEG_PATH, ImageFormat, ThumbnailerOptions};

pub const DEFAULT_INTERVAL_MS: u64 = 10_000;

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub ffmpeg: FfmpegConfig,
    pub execution: ExecutionConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegConfig {
    pub ffmpeg_path: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from(DEFAULT_FFMPEG_PATH),
        }
    }
}

/// Defaults applied to every execution request built from this config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub interval_ms: u64,
    pub width: Option<u32>,
    pub prefix: Option<String>,
    pub format: ImageFormat,
    /// `None` waits for late files indefinitely.
    pub drain_timeout_ms: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            width: None,
            prefix: None,
            format: ImageFormat::default(),
            drain_timeout_ms: None,
        }
    }
}

impl ExecutionConfig {
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

impl ConfigMetadata {
    pub fn env_file_loaded(&self) -> bool {
        self.env_file.is_some()
    }
}

/// Values given on the command line. Each one set here wins over every other
/// source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub ffmpeg_path: Option<PathBuf>,
    pub interval_ms: Option<u64>,
    pub width: Option<u32>,
    pub prefix: Option<String>,
    pub format: Option<ImageFormat>,
    pub drain_timeout_ms: Option<u64>,
}

impl Config {
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            ffmpeg_path,
            interval_ms,
            width,
            prefix,
            format,
            drain_timeout_ms,
        } = overrides;

        if let Some(path) = ffmpeg_path {
            self.ffmpeg.ffmpeg_path = path;
        }
        if let Some(interval) = interval_ms {
            self.execution.interval_ms = interval;
        }
        if width.is_some() {
            self.execution.width = width;
        }
        if prefix.is_some() {
            self.execution.prefix = prefix;
        }
        if let Some(format) = format {
            self.execution.format = format;
        }
        if drain_timeout_ms.is_some() {
            self.execution.drain_timeout_ms = drain_timeout_ms;
        }
    }

    pub fn thumbnailer_options(&self) -> ThumbnailerOptions {
        ThumbnailerOptions::from(self)
    }
}

impl From<&Config> for ThumbnailerOptions {
    fn from(config: &Config) -> Self {
        ThumbnailerOptions {
            ffmpeg_path: config.ffmpeg.ffmpeg_path.clone(),
            drain_timeout: config.execution.drain_timeout(),
        }
    }
}
