use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process error: {0}")]
    Process(#[source] std::io::Error),

    #[error("ffmpeg exited with status {}", display_code(.code))]
    NonZeroExit { code: Option<i32> },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Timed out waiting for {pending} thumbnail file(s) to appear")]
    DrainTimeout { pending: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThumbnailError {
    /// Exit code reported by the external tool, when the failure was a non-zero exit.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ThumbnailError::NonZeroExit { code } => *code,
            _ => None,
        }
    }

    /// True for failures raised before the external process was started.
    pub fn is_spawn_error(&self) -> bool {
        matches!(self, ThumbnailError::Spawn { .. })
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<terminated by signal>".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ThumbnailError>;
