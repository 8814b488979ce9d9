use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThumbnailError};

/// Width of the zero-padded sequence number in output file names.
pub const SEQUENCE_DIGITS: usize = 6;

/// Image container written by the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpg,
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = ThumbnailError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" => Ok(ImageFormat::Jpg),
            "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            other => Err(ThumbnailError::InvalidRequest(format!(
                "unsupported image format '{other}' (expected jpg, jpeg or png)"
            ))),
        }
    }
}

/// Everything one thumbnail extraction run needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub video_file: PathBuf,
    /// One thumbnail is sampled every `interval_millis` of presentation time.
    pub interval_millis: u64,
    pub dest_dir: PathBuf,
    /// Output width in pixels; height follows the source aspect ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name_prefix: Option<String>,
    #[serde(default)]
    pub ext: ImageFormat,
}

impl ExecutionRequest {
    pub fn new(
        video_file: impl Into<PathBuf>,
        interval_millis: u64,
        dest_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            video_file: video_file.into(),
            interval_millis,
            dest_dir: dest_dir.into(),
            width: None,
            file_name_prefix: None,
            ext: ImageFormat::default(),
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_name_prefix = Some(prefix.into());
        self
    }

    pub fn with_ext(mut self, ext: ImageFormat) -> Self {
        self.ext = ext;
        self
    }

    /// Reject requests the external tool could never satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.interval_millis == 0 {
            return Err(ThumbnailError::InvalidRequest(
                "interval_millis must be greater than zero".to_string(),
            ));
        }
        if self.width == Some(0) {
            return Err(ThumbnailError::InvalidRequest(
                "width must be greater than zero when set".to_string(),
            ));
        }
        if !self.dest_dir.is_dir() {
            return Err(ThumbnailError::InvalidRequest(format!(
                "destination directory does not exist: {}",
                self.dest_dir.display()
            )));
        }
        Ok(())
    }

    pub fn template(&self) -> FileNameTemplate {
        FileNameTemplate {
            dir: self.dest_dir.clone(),
            prefix: self.file_name_prefix.clone().unwrap_or_default(),
            ext: self.ext,
        }
    }

    /// Video filter chain: sampling, frame inspection, optional scaling.
    pub fn filter_chain(&self) -> String {
        let mut filters = vec![format!("fps=1000/{}", self.interval_millis)];
        filters.push("showinfo".to_string());
        if let Some(width) = self.width {
            filters.push(format!("scale={width}:-1"));
        }
        filters.join(",")
    }

    /// Argument vector handed to the external tool, in order.
    pub fn ffmpeg_args(&self) -> Vec<OsString> {
        vec![
            "-i".into(),
            self.video_file.clone().into_os_string(),
            "-f".into(),
            "image2".into(),
            "-start_number".into(),
            "0".into(),
            "-vf".into(),
            self.filter_chain().into(),
            self.template().ffmpeg_pattern().into_os_string(),
        ]
    }
}

/// Output naming shared by the argument builder and the diagnostic parser.
///
/// The external tool expands `%06d` itself; [`FileNameTemplate::file_name`]
/// must produce the exact same name for a given sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameTemplate {
    dir: PathBuf,
    prefix: String,
    ext: ImageFormat,
}

impl FileNameTemplate {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, ext: ImageFormat) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            ext,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<prefix>%06d.<ext>`, with `%` in the prefix escaped.
    pub fn ffmpeg_pattern(&self) -> PathBuf {
        let prefix = self.prefix.replace('%', "%%");
        self.dir
            .join(format!("{prefix}%0{SEQUENCE_DIGITS}d.{}", self.ext))
    }

    pub fn file_name(&self, n: u64) -> String {
        format!(
            "{}{:0width$}.{}",
            self.prefix,
            n,
            self.ext,
            width = SEQUENCE_DIGITS
        )
    }

    pub fn path(&self, n: u64) -> PathBuf {
        self.dir.join(self.file_name(n))
    }

    /// True when `name` is something [`FileNameTemplate::file_name`] could produce.
    pub fn matches(&self, name: &str) -> bool {
        let Some(digits) = name
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(self.ext.extension()))
            .and_then(|rest| rest.strip_suffix('.'))
        else {
            return false;
        };
        digits.len() >= SEQUENCE_DIGITS && digits.bytes().all(|b| b.is_ascii_digit())
    }
}
