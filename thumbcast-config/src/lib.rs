//! Configuration loading for thumbcast.
//!
//! Settings are layered (environment, `.env`, TOML file, defaults) by
//! [`ConfigLoader`], checked by the guard rails in [`validation`], and turned
//! into [`thumbcast_core::ThumbnailerOptions`] for the engine.

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    Config, ConfigMetadata, ConfigOverrides, DEFAULT_INTERVAL_MS, ExecutionConfig, FfmpegConfig,
};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
