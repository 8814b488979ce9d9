use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, ThumbnailError};
use crate::execution::{CompletionCell, ExecutionState, ThumbnailerExecution};
use crate::fs_watch::DirWatch;
use crate::request::ExecutionRequest;
use crate::supervisor::{Supervisor, SupervisorChannels};

pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailerOptions {
    /// Executable to launch; resolved through `PATH` when not absolute.
    pub ffmpeg_path: PathBuf,
    /// How long to wait, after a clean exit, for files still missing on disk.
    /// `None` waits indefinitely.
    #[serde(default)]
    pub drain_timeout: Option<Duration>,
}

impl Default for ThumbnailerOptions {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from(DEFAULT_FFMPEG_PATH),
            drain_timeout: None,
        }
    }
}

/// Launches thumbnail extractions.
///
/// A `Thumbnailer` holds no per-run state; each [`Thumbnailer::exec`] call
/// gets its own process, watch and event stream.
#[derive(Debug, Clone, Default)]
pub struct Thumbnailer {
    options: ThumbnailerOptions,
}

impl Thumbnailer {
    pub fn new(options: ThumbnailerOptions) -> Self {
        Self { options }
    }

    pub fn with_ffmpeg_path(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self::new(ThumbnailerOptions {
            ffmpeg_path: ffmpeg_path.into(),
            ..ThumbnailerOptions::default()
        })
    }

    pub fn options(&self) -> &ThumbnailerOptions {
        &self.options
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.options.ffmpeg_path
    }

    /// Start one extraction.
    ///
    /// The destination watch is established before the process is launched,
    /// so no file written by the process goes unnoticed. Failures to launch
    /// the process are reported through the execution's completion, not here;
    /// this only fails for invalid requests, watch setup errors or when called
    /// outside a Tokio runtime.
    pub fn exec(&self, request: ExecutionRequest) -> Result<ThumbnailerExecution> {
        request.validate()?;

        let runtime = Handle::try_current().map_err(|err| {
            ThumbnailError::Internal(format!("exec requires a Tokio runtime: {err}"))
        })?;

        let (watch_tx, watch_rx) = mpsc::unbounded_channel();
        let dir_watch = DirWatch::start(&request.dest_dir, watch_tx)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(ExecutionState::Running);
        let cancel = CancellationToken::new();
        let pid = Arc::new(OnceLock::new());

        debug!(
            ffmpeg = %self.options.ffmpeg_path.display(),
            video = %request.video_file.display(),
            "starting thumbnail execution"
        );

        let supervisor = Supervisor::new(
            self.options.ffmpeg_path.clone(),
            request,
            self.options.drain_timeout,
            dir_watch,
            watch_rx,
            SupervisorChannels {
                events: events_tx,
                state: state_tx,
                completion: CompletionCell::new(completion_tx),
                cancel: cancel.clone(),
                pid: Arc::clone(&pid),
            },
        );
        let task = runtime.spawn(supervisor.run());

        Ok(ThumbnailerExecution::new(
            events_rx,
            completion_rx,
            state_rx,
            cancel,
            pid,
            task,
        ))
    }
}
