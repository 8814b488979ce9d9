//! # thumbcast
//!
//! Extracts one thumbnail every N milliseconds of a video with `ffmpeg` and
//! prints each one as soon as its file exists, one line per thumbnail.
//! Ctrl-C stops ffmpeg and exits with an error.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use futures::StreamExt;
use thumbcast_config::{Config, ConfigLoad, ConfigLoader, ConfigOverrides, ConfigWarnings};
use thumbcast_core::{
    ExecutionEvent, ExecutionRequest, ImageFormat, Thumbnail, ThumbnailError, Thumbnailer,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "thumbcast", version)]
#[command(about = "Stream periodic thumbnails of a video as ffmpeg writes them")]
struct Cli {
    /// Video file to sample
    video: PathBuf,

    /// Directory the thumbnails are written to
    #[arg(short, long)]
    dest: PathBuf,

    /// Milliseconds of presentation time between thumbnails (overrides config)
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Thumbnail width in pixels; height keeps the aspect ratio
    #[arg(short, long)]
    width: Option<u32>,

    /// Prefix for generated file names
    #[arg(long)]
    prefix: Option<String>,

    /// Image format: jpg, jpeg or png
    #[arg(long)]
    ext: Option<ImageFormat>,

    /// ffmpeg executable (overrides config)
    #[arg(long, env = "THUMBCAST_FFMPEG_PATH")]
    ffmpeg: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, env = "THUMBCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Give up on files still missing this long after ffmpeg exits
    #[arg(long)]
    drain_timeout_ms: Option<u64>,

    /// Create the destination directory if it does not exist
    #[arg(long, default_value_t = false)]
    create_dest: bool,

    /// Print one JSON object per thumbnail
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Copy ffmpeg's own output to stderr
    #[arg(long, default_value_t = false)]
    ffmpeg_output: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            ffmpeg_path: self.ffmpeg.clone(),
            interval_ms: self.interval_ms,
            width: self.width,
            prefix: self.prefix.clone(),
            format: self.ext,
            drain_timeout_ms: self.drain_timeout_ms,
        }
    }

    fn request(&self, config: &Config) -> ExecutionRequest {
        let execution = &config.execution;
        let mut request =
            ExecutionRequest::new(&self.video, execution.interval_ms, &self.dest)
                .with_ext(execution.format);
        request.width = execution.width;
        request.file_name_prefix = execution.prefix.clone();
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&cli)?;
    run(&cli, &config).await
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "loaded configuration file");
    }
    if let Some(path) = &config.metadata.env_file {
        debug!(path = %path.display(), "loaded .env file");
    }
    log_warnings(&warnings);

    config.apply_overrides(cli.overrides());
    // Overrides bypass the loader's guard rails.
    if config.execution.interval_ms == 0 {
        bail!("--interval-ms must be greater than zero");
    }
    Ok(config)
}

fn log_warnings(warnings: &ConfigWarnings) {
    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => warn!(message = %warning.message, hint = %hint, "configuration warning"),
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
}

async fn run(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    if cli.create_dest {
        tokio::fs::create_dir_all(&cli.dest)
            .await
            .with_context(|| format!("failed to create {}", cli.dest.display()))?;
    }

    let thumbnailer = Thumbnailer::new(config.thumbnailer_options());
    let request = cli.request(config);
    info!(
        video = %request.video_file.display(),
        dest = %request.dest_dir.display(),
        interval_ms = request.interval_millis,
        ffmpeg = %thumbnailer.ffmpeg_path().display(),
        "extracting thumbnails"
    );

    let execution = thumbnailer
        .exec(request)
        .context("failed to start thumbnail extraction")?;
    let cancel = execution.cancellation_token();
    let (mut events, completion) = execution.into_parts();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut count = 0usize;
    let mut stdout = std::io::stdout().lock();

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(ExecutionEvent::Thumbnail(thumbnail)) => {
                    count += 1;
                    writeln!(stdout, "{}", render(&thumbnail, cli.json)?)
                        .context("failed to write to stdout")?;
                    stdout.flush().context("failed to write to stdout")?;
                }
                Some(ExecutionEvent::Stderr(line) | ExecutionEvent::Stdout(line)) => {
                    if cli.ffmpeg_output {
                        eprintln!("{line}");
                    }
                }
                None => break,
            },
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for ctrl-c");
                    continue;
                }
                warn!("interrupted, stopping ffmpeg");
                cancel.cancel();
            }
        }
    }

    match completion.await {
        Ok(()) => {
            info!(count, "done");
            Ok(())
        }
        Err(err @ ThumbnailError::NonZeroExit { .. }) if !cli.ffmpeg_output => Err(err)
            .context("ffmpeg failed; rerun with --ffmpeg-output to see its diagnostics"),
        Err(err) => Err(err).context("thumbnail extraction failed"),
    }
}

fn render(thumbnail: &Thumbnail, json: bool) -> anyhow::Result<String> {
    if json {
        return serde_json::to_string(thumbnail).context("failed to encode thumbnail");
    }
    let pts_time = thumbnail
        .pts_time
        .map(|seconds| seconds.to_string())
        .unwrap_or_else(|| "-".to_string());
    Ok(format!("{}\t{}\t{}", thumbnail.n, pts_time, thumbnail.file.display()))
}
