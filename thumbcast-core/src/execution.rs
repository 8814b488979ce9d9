//! Caller-facing handle for one running extraction.
//!
//! An execution is two things at once: a push stream of events (thumbnails as
//! they become ready, plus the raw output lines of the external tool) and a
//! single completion result. The stream ends after the completion has been
//! settled and the directory watch is gone.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Result, ThumbnailError};
use crate::thumbnail::Thumbnail;

/// Lifecycle of one execution, as observed from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    ExitedSuccess,
    ExitedFailure(Option<i32>),
    ProcessError(String),
    /// Process is gone; the watch stays open until pending metadata is matched.
    Draining,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    Thumbnail(Thumbnail),
    Stdout(String),
    Stderr(String),
}

impl ExecutionEvent {
    pub fn into_thumbnail(self) -> Option<Thumbnail> {
        match self {
            ExecutionEvent::Thumbnail(thumbnail) => Some(thumbnail),
            _ => None,
        }
    }
}

/// Write side of the completion result.
///
/// The first settlement decides the outcome; it is held back until
/// [`CompletionCell::deliver`] so the caller only wakes once teardown is over.
#[derive(Debug)]
pub(crate) struct CompletionCell {
    tx: Option<oneshot::Sender<Result<()>>>,
    outcome: Option<Result<()>>,
}

impl CompletionCell {
    pub(crate) fn new(tx: oneshot::Sender<Result<()>>) -> Self {
        Self {
            tx: Some(tx),
            outcome: None,
        }
    }

    /// Returns false when the result had already been settled.
    pub(crate) fn settle(&mut self, result: Result<()>) -> bool {
        if self.outcome.is_some() {
            trace!(?result, "completion already settled");
            return false;
        }
        self.outcome = Some(result);
        true
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    /// Hand the settled outcome to the caller. Later calls do nothing.
    pub(crate) fn deliver(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let result = self.outcome.take().unwrap_or_else(|| {
            Err(ThumbnailError::Internal(
                "supervisor stopped without an outcome".to_string(),
            ))
        });
        // Caller may have dropped the completion; the outcome stands either way.
        let _ = tx.send(result);
    }
}

/// Resolves once with the overall outcome of an execution.
///
/// `Ok(())` means the process exited with status 0 and every thumbnail it
/// announced was seen on disk.
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<()>>,
}

impl Completion {
    pub async fn wait(self) -> Result<()> {
        self.await
    }
}

impl Future for Completion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(ThumbnailError::Internal(
                    "execution ended without reporting a result".to_string(),
                ))
            })
        })
    }
}

/// Stream of [`ExecutionEvent`]s for one execution.
#[derive(Debug)]
pub struct ExecutionEvents {
    inner: UnboundedReceiverStream<ExecutionEvent>,
}

impl ExecutionEvents {
    pub async fn next_event(&mut self) -> Option<ExecutionEvent> {
        self.inner.next().await
    }

    /// Next thumbnail, skipping output line events.
    pub async fn next_thumbnail(&mut self) -> Option<Thumbnail> {
        while let Some(event) = self.inner.next().await {
            if let ExecutionEvent::Thumbnail(thumbnail) = event {
                return Some(thumbnail);
            }
        }
        None
    }

    pub fn thumbnails(self) -> impl Stream<Item = Thumbnail> + Unpin {
        self.inner.filter_map(ExecutionEvent::into_thumbnail)
    }
}

impl Stream for ExecutionEvents {
    type Item = ExecutionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Handle returned by [`crate::Thumbnailer::exec`].
///
/// Events are buffered from the moment the process starts, so nothing is
/// lost if the caller starts reading a little later.
#[derive(Debug)]
pub struct ThumbnailerExecution {
    events: ExecutionEvents,
    completion: Completion,
    state: watch::Receiver<ExecutionState>,
    cancel: CancellationToken,
    pid: Arc<OnceLock<u32>>,
    task: JoinHandle<()>,
}

impl ThumbnailerExecution {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<ExecutionEvent>,
        completion: oneshot::Receiver<Result<()>>,
        state: watch::Receiver<ExecutionState>,
        cancel: CancellationToken,
        pid: Arc<OnceLock<u32>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events: ExecutionEvents {
                inner: UnboundedReceiverStream::new(events),
            },
            completion: Completion { rx: completion },
            state,
            cancel,
            pid,
            task,
        }
    }

    pub async fn next_event(&mut self) -> Option<ExecutionEvent> {
        self.events.next_event().await
    }

    pub async fn next_thumbnail(&mut self) -> Option<Thumbnail> {
        self.events.next_thumbnail().await
    }

    /// Kill the process and tear down the watch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this execution; it stays usable after
    /// [`ThumbnailerExecution::into_parts`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> ExecutionState {
        self.state.borrow().clone()
    }

    /// Process id, once the process has been started.
    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    /// Subscribe to lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<ExecutionState> {
        self.state.clone()
    }

    /// True once the supervising task has released the process and the watch.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the outcome, discarding any events not read yet.
    pub async fn wait(self) -> Result<()> {
        self.completion.await
    }

    pub fn into_parts(self) -> (ExecutionEvents, Completion) {
        (self.events, self.completion)
    }
}
