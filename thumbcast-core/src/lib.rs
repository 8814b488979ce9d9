//! # Thumbcast Core
//!
//! Streaming thumbnail extraction on top of an external `ffmpeg` binary.
//!
//! ## Overview
//!
//! An execution samples one frame every `interval_millis` of presentation time
//! and writes it to a destination directory. `ffmpeg` announces each frame on
//! stderr (via the `showinfo` filter) and writes the image file on its own
//! schedule; this crate pairs the two signals and reports a [`Thumbnail`] only
//! once both have been seen:
//!
//! - [`line_parser`]: chunk-to-line splitting for the process output streams
//! - [`showinfo`]: per-frame diagnostic parsing
//! - [`correlator`]: matching metadata with files on disk
//! - [`Thumbnailer`] / [`ThumbnailerExecution`]: launching and observing runs
//!
//! ## Examples
//!
//! ```no_run
//! use thumbcast_core::{ExecutionRequest, Thumbnailer};
//!
//! async fn extract() -> Result<(), thumbcast_core::ThumbnailError> {
//!     let request = ExecutionRequest::new("movie.mp4", 10_000, "/tmp/thumbs").with_width(320);
//!     let mut execution = Thumbnailer::default().exec(request)?;
//!
//!     while let Some(thumbnail) = execution.next_thumbnail().await {
//!         println!("{} at {:?}s", thumbnail.file.display(), thumbnail.pts_time);
//!     }
//!     execution.wait().await
//! }
//! ```

pub mod correlator;
pub mod error;
pub mod execution;
mod fs_watch;
pub mod line_parser;
pub mod request;
pub mod showinfo;
mod supervisor;
pub mod thumbnail;
pub mod thumbnailer;

pub use error::{Result, ThumbnailError};
pub use execution::{
    Completion, ExecutionEvent, ExecutionEvents, ExecutionState, ThumbnailerExecution,
};
pub use request::{ExecutionRequest, FileNameTemplate, ImageFormat};
pub use thumbnail::Thumbnail;
pub use thumbnailer::{DEFAULT_FFMPEG_PATH, Thumbnailer, ThumbnailerOptions};
