use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A sampled frame whose image file is known to exist on disk.
///
/// Numeric fields are `None` when the external tool reported something that
/// did not parse as a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Sequence number assigned by the external tool, starting at 0.
    pub n: u64,
    pub file: PathBuf,
    pub pts: Option<i64>,
    /// Presentation time in whole seconds (truncated toward zero).
    pub pts_time: Option<i64>,
    /// Byte position of the source frame in the input stream.
    pub pos: Option<i64>,
    /// Frame size as printed by the tool, e.g. `320x180`.
    pub size: String,
}

impl Thumbnail {
    /// Base name used to correlate the record with filesystem events.
    pub fn file_name(&self) -> Option<String> {
        file_name_of(&self.file)
    }
}

pub(crate) fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}
