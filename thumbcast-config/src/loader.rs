use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::debug;

use crate::models::{Config, ConfigMetadata, ExecutionConfig, FfmpegConfig};
use crate::sources::{EnvConfig, FileConfig};
use crate::validation::{self, ConfigGuardRailError, ConfigWarnings};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("thumbcast.toml"),
        PathBuf::from("config/thumbcast.toml"),
    ]
});

const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Replaces the process environment when set.
    pub vars: Option<Vec<(String, String)>>,
}

/// Composes configuration from, highest precedence first: environment
/// variables, a `.env` file, a TOML file and built-in defaults.
///
/// The `.env` file is read without touching the process environment.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options.vars = Some(
            vars.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (dotenv_vars, env_file) = self.read_env_file()?;

        let process_vars = match &self.options.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        };
        let env_config = EnvConfig::from_vars(dotenv_vars.into_iter().chain(process_vars))?;

        let (file_config, config_path) = self.load_file_config(&env_config)?;

        let metadata = ConfigMetadata {
            config_path,
            env_file,
        };
        let (config, warnings) = compose_config(file_config, env_config, metadata)?;

        Ok(ConfigLoad { config, warnings })
    }

    fn read_env_file(&self) -> Result<(Vec<(String, String)>, Option<PathBuf>), ConfigLoadError> {
        let path = self
            .options
            .env_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));

        let iter = match dotenvy::from_path_iter(&path) {
            Ok(iter) => iter,
            Err(dotenvy::Error::Io(_)) => return Ok((Vec::new(), None)),
            Err(err) => return Err(err.into()),
        };

        let vars = iter.collect::<Result<Vec<_>, _>>()?;
        debug!(path = %path.display(), count = vars.len(), "loaded env file");
        Ok((vars, Some(path)))
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        } else {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        debug!(path = %path.display(), ?provenance, "loaded config file");
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let FileConfig {
        ffmpeg: file_ffmpeg,
        execution: file_execution,
    } = file_config.unwrap_or_default();

    let defaults = ExecutionConfig::default();

    let ffmpeg = FfmpegConfig {
        ffmpeg_path: env
            .ffmpeg_path
            .or(file_ffmpeg.ffmpeg_path)
            .unwrap_or_else(|| FfmpegConfig::default().ffmpeg_path),
    };

    let execution = ExecutionConfig {
        interval_ms: env
            .default_interval_ms
            .or(file_execution.interval_ms)
            .unwrap_or(defaults.interval_ms),
        width: file_execution.width,
        prefix: file_execution.prefix,
        format: env
            .default_format
            .or(file_execution.format)
            .unwrap_or(defaults.format),
        drain_timeout_ms: env.drain_timeout_ms.or(file_execution.drain_timeout_ms),
    };

    let config = Config {
        ffmpeg,
        execution,
        metadata,
    };

    let warnings = validation::apply_guard_rails(&config)?;
    Ok((config, warnings))
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidEnv {
        key: String,
        value: String,
        expected: &'static str,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(self, ConfigPathProvenance::Explicit | ConfigPathProvenance::Env)
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
