use thiserror::Error;

use crate::models::Config;

/// Below this interval a single run produces an unreasonable number of files.
const MIN_REASONABLE_INTERVAL_MS: u64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("execution.interval_ms must be greater than zero")]
    ZeroInterval,
    #[error("execution.width must be greater than zero when set")]
    ZeroWidth,
    #[error("ffmpeg path is empty")]
    EmptyFfmpegPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();
    let execution = &config.execution;

    if execution.interval_ms == 0 {
        return Err(ConfigGuardRailError::ZeroInterval);
    }
    if execution.width == Some(0) {
        return Err(ConfigGuardRailError::ZeroWidth);
    }
    if config.ffmpeg.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigGuardRailError::EmptyFfmpegPath);
    }

    if execution.interval_ms < MIN_REASONABLE_INTERVAL_MS {
        warnings.push_with_hint(
            format!(
                "interval of {}ms samples more than ten thumbnails per second of video",
                execution.interval_ms
            ),
            "Raise execution.interval_ms unless every frame is really wanted",
        );
    }

    if execution.drain_timeout_ms == Some(0) {
        warnings.push_with_hint(
            "drain timeout of 0ms fails any run whose last files land after ffmpeg exits",
            "Unset THUMBCAST_DRAIN_TIMEOUT_MS to wait indefinitely, or give it a few seconds",
        );
    }

    let ffmpeg_path = &config.ffmpeg.ffmpeg_path;
    if ffmpeg_path.components().count() > 1 && !ffmpeg_path.is_file() {
        warnings.push_with_hint(
            format!("ffmpeg binary not found at {}", ffmpeg_path.display()),
            "Set THUMBCAST_FFMPEG_PATH or ffmpeg.ffmpeg_path to an installed ffmpeg",
        );
    }

    if let Some(prefix) = &execution.prefix
        && prefix.contains(['/', '\\'])
    {
        warnings.push(format!(
            "file name prefix '{prefix}' contains a path separator; thumbnails will not land in the destination directory"
        ));
    }

    Ok(warnings)
}
