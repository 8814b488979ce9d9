//! Background task that owns one ffmpeg child process.
//!
//! Output readers run as their own tasks and forward complete lines. Everything
//! else (the child, the correlator, the directory watch and the completion
//! result) lives in [`Supervisor::run`], which reacts to lines, watch
//! notifications, process exit, cancellation and the optional drain deadline
//! from a single `select!` loop.

use std::ffi::OsString;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::{Sleep, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::correlator::Correlator;
use crate::error::{Result, ThumbnailError};
use crate::execution::{CompletionCell, ExecutionEvent, ExecutionState};
use crate::fs_watch::{DirWatch, WatchMessage, appeared_file_name};
use crate::line_parser::{ChunkDecoder, LineParser};
use crate::request::{ExecutionRequest, FileNameTemplate};
use crate::showinfo;
use crate::thumbnail::Thumbnail;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct StreamLine {
    stream: OutputStream,
    line: String,
}

/// Channels and settings a supervisor reports through.
#[derive(Debug)]
pub(crate) struct SupervisorChannels {
    pub(crate) events: mpsc::UnboundedSender<ExecutionEvent>,
    pub(crate) state: watch::Sender<ExecutionState>,
    pub(crate) completion: CompletionCell,
    pub(crate) cancel: CancellationToken,
    pub(crate) pid: Arc<OnceLock<u32>>,
}

#[derive(Debug)]
pub(crate) struct Supervisor {
    program: PathBuf,
    request: ExecutionRequest,
    template: FileNameTemplate,
    drain_timeout: Option<Duration>,
    correlator: Correlator,
    watch: Option<DirWatch>,
    watch_rx: mpsc::UnboundedReceiver<WatchMessage>,
    events: mpsc::UnboundedSender<ExecutionEvent>,
    state: watch::Sender<ExecutionState>,
    completion: CompletionCell,
    cancel: CancellationToken,
    pid: Arc<OnceLock<u32>>,
}

impl Supervisor {
    pub(crate) fn new(
        program: PathBuf,
        request: ExecutionRequest,
        drain_timeout: Option<Duration>,
        watch: DirWatch,
        watch_rx: mpsc::UnboundedReceiver<WatchMessage>,
        channels: SupervisorChannels,
    ) -> Self {
        let template = request.template();
        Self {
            program,
            request,
            correlator: Correlator::new(template.clone()),
            template,
            drain_timeout,
            watch: Some(watch),
            watch_rx,
            events: channels.events,
            state: channels.state,
            completion: channels.completion,
            cancel: channels.cancel,
            pid: channels.pid,
        }
    }

    pub(crate) async fn run(mut self) {
        let args = self.request.ffmpeg_args();
        let mut child = match self.spawn(&args) {
            Ok(child) => child,
            Err(err) => {
                error!(program = %self.program.display(), error = %err, "failed to start ffmpeg");
                self.set_state(ExecutionState::ProcessError(err.to_string()));
                self.completion.settle(Err(err));
                self.finish();
                return;
            }
        };

        if let Some(pid) = child.id() {
            let _ = self.pid.set(pid);
        }
        info!(
            pid = child.id(),
            video = %self.request.video_file.display(),
            dest = %self.request.dest_dir.display(),
            interval_ms = self.request.interval_millis,
            "ffmpeg started"
        );

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_lines(OutputStream::Stdout, stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_lines(OutputStream::Stderr, stderr, line_tx.clone()));
        }
        drop(line_tx);

        let cancel = self.cancel.clone();
        let mut streams_open = true;
        let mut exited = false;
        let mut watch_open = true;
        let mut drain_deadline: Option<Pin<Box<Sleep>>> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.kill(&mut child).await;
                    break;
                }
                line = line_rx.recv(), if streams_open => match line {
                    Some(StreamLine { stream, line }) => self.handle_line(stream, line),
                    None => {
                        debug!("ffmpeg output streams closed");
                        streams_open = false;
                    }
                },
                status = child.wait(), if !exited => {
                    exited = true;
                    self.handle_exit(status);
                }
                message = self.watch_rx.recv(), if watch_open => match message {
                    Some(message) => self.handle_watch(message),
                    None => watch_open = false,
                },
                _ = wait_deadline(&mut drain_deadline) => {
                    let pending = self.correlator.pending_len();
                    warn!(pending, "gave up waiting for thumbnail files");
                    self.completion.settle(Err(ThumbnailError::DrainTimeout { pending }));
                    break;
                }
            }

            if streams_open || !exited {
                continue;
            }
            if self.completion.is_settled() {
                break;
            }
            if !self.is_draining() {
                self.begin_drain();
                drain_deadline = self.drain_timeout.map(|timeout| Box::pin(sleep(timeout)));
            }
            if self.correlator.is_drained() {
                self.completion.settle(Ok(()));
                break;
            }
        }

        self.finish();
    }

    fn spawn(&self, args: &[OsString]) -> Result<Child> {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ThumbnailError::Spawn {
                program: self.program.display().to_string(),
                source,
            })
    }

    async fn kill(&mut self, child: &mut Child) {
        info!(pid = child.id(), "cancelling ffmpeg");
        if let Err(err) = child.kill().await {
            // Already exited between the last poll and the kill.
            debug!(error = %err, "kill after exit");
        }
        self.completion.settle(Err(ThumbnailError::Cancelled));
    }

    fn handle_line(&mut self, stream: OutputStream, line: String) {
        match stream {
            OutputStream::Stdout => {
                trace!(line = %line, "ffmpeg stdout");
                self.emit(ExecutionEvent::Stdout(line));
            }
            OutputStream::Stderr => {
                trace!(line = %line, "ffmpeg stderr");
                let parsed = showinfo::parse_line(&line, &self.template);
                self.emit(ExecutionEvent::Stderr(line));
                if let Some(thumbnail) = parsed
                    && let Some(ready) = self.correlator.record(thumbnail)
                {
                    self.emit_thumbnail(ready);
                }
            }
        }
    }

    fn handle_watch(&mut self, message: WatchMessage) {
        match message {
            WatchMessage::Event(event) => {
                if let Some(name) = appeared_file_name(&event)
                    && let Some(ready) = self.correlator.observe(&name)
                {
                    self.emit_thumbnail(ready);
                }
            }
            WatchMessage::Error(message) => {
                warn!(dir = %self.template.dir().display(), error = %message, "directory watch error");
            }
        }
    }

    fn handle_exit(&mut self, status: std::io::Result<ExitStatus>) {
        match status {
            Ok(status) if status.success() => {
                info!("ffmpeg exited successfully");
                self.set_state(ExecutionState::ExitedSuccess);
            }
            Ok(status) => {
                let code = status.code();
                warn!(?code, "ffmpeg exited with failure");
                self.set_state(ExecutionState::ExitedFailure(code));
                self.completion
                    .settle(Err(ThumbnailError::NonZeroExit { code }));
            }
            Err(err) => {
                error!(error = %err, "failed to wait for ffmpeg");
                self.set_state(ExecutionState::ProcessError(err.to_string()));
                self.completion.settle(Err(ThumbnailError::Process(err)));
            }
        }
    }

    fn begin_drain(&mut self) {
        self.set_state(ExecutionState::Draining);
        let released = self.correlator.reconcile(|path| path.is_file());
        if !released.is_empty() {
            debug!(count = released.len(), "released thumbnails found on disk");
        }
        for thumbnail in released {
            self.emit_thumbnail(thumbnail);
        }
        if !self.correlator.is_drained() {
            debug!(
                pending = self.correlator.pending_len(),
                "waiting for remaining thumbnail files"
            );
        }
    }

    fn is_draining(&self) -> bool {
        matches!(*self.state.borrow(), ExecutionState::Draining)
    }

    fn emit_thumbnail(&self, thumbnail: Thumbnail) {
        debug!(n = thumbnail.n, file = %thumbnail.file.display(), "thumbnail");
        self.emit(ExecutionEvent::Thumbnail(thumbnail));
    }

    fn emit(&self, event: ExecutionEvent) {
        // No subscriber left; keep running so the process is still reaped.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ExecutionState) {
        self.state.send_replace(state);
    }

    /// Close the watch and publish `Done` before the caller sees the outcome.
    fn finish(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.close();
        }
        self.watch_rx.close();
        self.set_state(ExecutionState::Done);
        info!(
            emitted = self.correlator.emitted_len(),
            pending = self.correlator.pending_len(),
            "execution finished"
        );
        self.completion.deliver();
    }
}

async fn wait_deadline(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Forward complete lines from one output stream until EOF.
async fn read_lines<R>(stream: OutputStream, mut reader: R, tx: mpsc::UnboundedSender<StreamLine>)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = ChunkDecoder::new();
    let mut parser = LineParser::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(read) => {
                let text = decoder.decode(&buf[..read]);
                for line in parser.add(&text) {
                    if tx.send(StreamLine { stream, line }).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(?stream, error = %err, "failed to read ffmpeg output");
                break;
            }
        }
    }

    let tail = decoder.finish();
    let mut lines = parser.add(&tail);
    let last = parser.flush();
    if !last.is_empty() {
        lines.push(last);
    }
    for line in lines {
        let _ = tx.send(StreamLine { stream, line });
    }
}
